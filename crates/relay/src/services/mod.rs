pub mod broadcaster;
pub mod subscription_service;
