pub mod capture;
pub mod http;
pub mod shutdown;
