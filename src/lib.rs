//! CourseHub - A course marketplace backend
//!
//! Teachers publish video courses, students buy them through hosted
//! checkout and watch their lessons. Video processing, payments and
//! identity are delegated to external providers.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod providers;
pub mod services;
