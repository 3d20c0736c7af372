pub mod check;
pub mod sign;
