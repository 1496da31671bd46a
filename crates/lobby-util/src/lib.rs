pub mod snowflake;
pub mod typing;
