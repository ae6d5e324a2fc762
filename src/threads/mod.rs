pub mod chord;
pub mod join;
pub mod maintenance;
pub mod shutdown;
pub mod web;
