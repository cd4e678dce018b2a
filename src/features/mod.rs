//! Static per-cell feature layers: POIs, roads, transit stops, population
//! and distance to the city centre. Each layer reads its own inputs, emits
//! one full-coverage frame keyed on `grid_id` and is independent of the
//! others; only the table assembler joins them.

pub mod centre;
pub mod poi;
pub mod population;
pub mod roads;
pub mod transit;
