//! Built-in strategies.

pub mod buy_and_hold;
pub mod ma_breakout;

pub use buy_and_hold::BuyAndHold;
pub use ma_breakout::MaBreakout;
