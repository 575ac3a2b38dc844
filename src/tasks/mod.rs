pub mod poll_expirer;
