pub mod crs;
pub mod csv;
pub mod fs;
pub mod paths;
pub mod shp;
