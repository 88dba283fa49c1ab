pub mod backend;
pub mod rest;
