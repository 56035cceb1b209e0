pub mod calibration;
pub mod http_broker;
pub mod pool;
pub mod worker;
