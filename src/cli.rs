//! Command-line argument schema.

use std::path::PathBuf;

use crate::config::Peak;

#[derive(clap::Parser, Debug)]
#[command(name = "pedalgrid", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Pipeline configuration JSON; defaults are the Xi'an study area
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Artifact directory root
    #[arg(short, long, global = true, default_value = "./data", value_hint = clap::ValueHint::DirPath)]
    pub data: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Build the fishnet from the district boundaries
    Fishnet(FishnetArgs),

    /// Clean and project the raw OD trips for a peak window
    Trips(TripsArgs),

    /// Split cleaned trips across the fishnet cells
    Segments(PeakArgs),

    /// Aggregate per-cell trip length into avoided CO2
    Emissions(PeakArgs),

    /// Count POIs per class per cell and compute the land-use mix
    Poi(PoiArgs),

    /// Per-cell road centreline length and density
    Roads(RoadsArgs),

    /// Per-cell stop counts and nearest-stop distances
    Transit(TransitArgs),

    /// Per-cell mean population density from the raster
    Population(PopulationArgs),

    /// Distance from each cell centroid to the city centre
    Centre,

    /// Join all per-cell artifacts into the final tables
    Assemble(PeakArgs),

    /// Run the whole pipeline end to end
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct FishnetArgs {
    /// District boundary shapefile
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub districts: PathBuf,

    /// EPSG code the boundary file is in
    #[arg(long, default_value_t = 4547)]
    pub epsg: u32,
}

#[derive(clap::Args, Debug)]
pub struct TripsArgs {
    /// Raw OD trip CSV
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub od: PathBuf,

    /// District boundary shapefile (for the containment filter)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub districts: PathBuf,

    /// EPSG code the boundary file is in
    #[arg(long, default_value_t = 4547)]
    pub epsg: u32,

    /// Peak window to clean; both when omitted
    #[arg(long)]
    pub peak: Option<Peak>,
}

#[derive(clap::Args, Debug)]
pub struct PeakArgs {
    /// Peak window to process; both when omitted
    #[arg(long)]
    pub peak: Option<Peak>,
}

#[derive(clap::Args, Debug)]
pub struct PoiArgs {
    /// POI layer: shapefile points or a subclass,lon,lat CSV
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub pois: PathBuf,

    /// Attribute carrying the POI subclass
    #[arg(long, default_value = "subclass")]
    pub subclass_field: String,

    /// Override the embedded subclass-to-class table
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub classes: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RoadsArgs {
    /// Road network shapefile
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub roads: PathBuf,

    /// EPSG code the network is in
    #[arg(long, default_value_t = 4326)]
    pub epsg: u32,
}

#[derive(clap::Args, Debug)]
pub struct TransitArgs {
    /// Bus stop layer: shapefile points or a name,lon,lat CSV
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub bus: PathBuf,

    /// Metro stop layer: shapefile points or a name,lon,lat CSV
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub metro: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct PopulationArgs {
    /// Population density GeoTIFF (WGS84)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub raster: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// District boundary shapefile
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub districts: PathBuf,

    /// EPSG code the boundary file is in
    #[arg(long, default_value_t = 4547)]
    pub epsg: u32,

    /// Raw OD trip CSV
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub od: PathBuf,

    /// POI layer
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub pois: PathBuf,

    /// Attribute carrying the POI subclass
    #[arg(long, default_value = "subclass")]
    pub subclass_field: String,

    /// Override the embedded subclass-to-class table
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub classes: Option<PathBuf>,

    /// Road network shapefile
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub roads: PathBuf,

    /// EPSG code the road network is in
    #[arg(long, default_value_t = 4326)]
    pub roads_epsg: u32,

    /// Bus stop layer
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub bus: PathBuf,

    /// Metro stop layer
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub metro: PathBuf,

    /// Population density GeoTIFF
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub raster: PathBuf,
}
