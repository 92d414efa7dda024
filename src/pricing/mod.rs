pub mod complete_set;
pub mod volmm;

pub use complete_set::{price_complete_set_legs, select_profit, CompleteSetQuote};
pub use volmm::{desired_quotes, VolMmInputs, VolMmQuotes};
