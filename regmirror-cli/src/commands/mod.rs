pub mod catalog;
pub mod orphans;
pub mod run;
pub mod status;
pub mod unlock;
