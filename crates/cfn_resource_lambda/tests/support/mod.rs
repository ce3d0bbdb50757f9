#![allow(dead_code)]

pub mod fakes;
pub mod requests;
pub mod resources;
