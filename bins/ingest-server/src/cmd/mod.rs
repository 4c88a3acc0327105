pub mod enrich;
pub mod run;
pub mod validate;
