//! Process bootstrap helpers run once from `main`.

pub mod logger;
