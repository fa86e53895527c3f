pub mod address;
pub mod blocks;
pub mod config;
pub mod fetch;
pub mod history;
pub mod layer;
pub mod pipeline;
pub mod process;
pub mod turnout;
pub mod voters;
