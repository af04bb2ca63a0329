pub mod remote;
pub mod web;
