pub mod quick;
pub mod sensitivity;
