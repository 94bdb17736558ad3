pub mod blueprint;
pub mod codec;
pub mod dataset;
pub mod ga;
pub mod progress;
pub mod report;

#[macro_export]
macro_rules! bail_assert {
    ($cond:expr) => {
        if !$cond {
            bail!("Assertion failed: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            bail!($($arg)+);
        }
    };
}
