pub mod calculator;
pub mod executor;
pub mod perception;
pub mod planner;
pub mod slots;

pub use calculator::{CalcError, LocalCalculator};
pub use executor::{ActionExecutor, Execution};
pub use perception::PatternMatcher;
