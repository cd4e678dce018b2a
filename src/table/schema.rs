//! Final per-peak table schema.

pub const GRID_ID: &str = "grid_id";

/// The modelling target; exempt from winsorization.
pub const TARGET: &str = "carbon_reduction_kg";

/// Feature columns of the final table, in emission order. `grid_id` comes
/// first in the CSV and is never transformed.
pub const FINAL_COLUMNS: [&str; 13] = [
    TARGET,
    "population_density_kpersons_per_km2",
    "leisure_poi_count",
    "office_poi_count",
    "public_service_poi_count",
    "transport_facility_poi_count",
    "residential_poi_count",
    "road_density_km_per_km2",
    "metro_count",
    "bus_count",
    "land_mix_entropy_norm",
    "distance_to_centre_km",
    "nearest_bus_distance_km",
];
