//! Shared component fixtures for the integration suites.
#![allow(dead_code)]

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentA {
    pub d: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentB {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentC {
    pub values: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentEmpty;
