pub mod fsm;
pub mod names;
pub mod protocol;
pub mod router;
pub mod timing;
pub mod wheel;
