mod dispatch;

pub use dispatch::*;
