//! Per-cell CO2-avoidance features for shared-bicycle trips.
//!
//! A batch pipeline that tiles a city into a 500 m fishnet, splits peak-hour
//! OD trips across the cells, converts cycled length into avoided CO2, and
//! joins the result with POI, road, transit, population and centre-distance
//! layers into one analysis-ready table per peak window.

pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod emissions;
pub mod features;
pub mod fishnet;
pub mod ingest;
pub mod segments;
pub mod summary;
pub mod table;
pub mod trips;
