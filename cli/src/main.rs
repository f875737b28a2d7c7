#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::path::{Path, PathBuf};

use abstutil::Timer;
use anyhow::Result;
use structopt::StructOpt;

use gtfs::{IndexOptions, RouteGeometry, ScheduleIndex, ServiceID, TripName, GTFS};

const POINTS: &str = "points.json";
const REALTIME: &str = "realtime.json";
const REPORT: &str = "report.json";

#[derive(StructOpt)]
#[structopt(
    name = "train_spotting",
    about = "Reconstructs when trains actually reached each stop from realtime snapshots"
)]
enum Command {
    /// Build the schedule index for one route from GTFS
    Schedule {
        #[structopt(flatten)]
        schedule: ScheduleArgs,
        /// The directory to write stops_ancestor.json, stops.json, trips.json,
        /// schedule_warnings.json, and maybe points.json
        #[structopt(long)]
        out: PathBuf,
    },
    /// Reconcile realtime snapshots against a schedule index previously written to --out
    Realtime {
        #[structopt(flatten)]
        realtime: RealtimeArgs,
        /// The directory with the schedule index. realtime.json and report.json go here too.
        #[structopt(long)]
        out: PathBuf,
    },
    /// Both steps at once
    Run {
        #[structopt(flatten)]
        schedule: ScheduleArgs,
        #[structopt(flatten)]
        realtime: RealtimeArgs,
        #[structopt(long)]
        out: PathBuf,
    },
}

#[derive(StructOpt)]
struct ScheduleArgs {
    /// A GTFS directory or zip file
    #[structopt(long)]
    gtfs: PathBuf,
    /// Only trips from this service are used
    #[structopt(long)]
    service_id: String,
    /// The trip used to find and order all the stops
    #[structopt(long)]
    reference_trip: String,
    /// Text to remove from stop names, like "Caltrain Station". Can be repeated.
    #[structopt(long)]
    strip_stop_name: Vec<String>,
}

#[derive(StructOpt)]
struct RealtimeArgs {
    /// A directory of {YYYY-MM-DD}/{HHMM}.json StopMonitoring snapshots
    #[structopt(long)]
    snapshots: PathBuf,
    /// A JSON list of [longitude, latitude] pairs or GeoJSON LineString for the route. Defaults to
    /// points.json in the output directory.
    #[structopt(long)]
    route: Option<PathBuf>,
}

fn main() -> Result<()> {
    abstutil::logger::setup();
    let cmd = Command::from_iter(abstutil::cli_args());
    let mut timer = Timer::new("train_spotting");

    match cmd {
        Command::Schedule { schedule, out } => {
            let index = build_schedule(&schedule, &out, &mut timer)?;
            if !index.warnings.is_empty() {
                warn!(
                    "{} problems with the schedule; see the log above",
                    index.warnings.len()
                );
            }
        }
        Command::Realtime { realtime, out } => {
            let index = ScheduleIndex::read_from_dir(&out)?;
            reconcile(&index, &realtime, &out, &mut timer)?;
        }
        Command::Run {
            schedule,
            realtime,
            out,
        } => {
            let index = build_schedule(&schedule, &out, &mut timer)?;
            reconcile(&index, &realtime, &out, &mut timer)?;
        }
    }
    Ok(())
}

fn build_schedule(args: &ScheduleArgs, out: &Path, timer: &mut Timer) -> Result<ScheduleIndex> {
    let service_id = ServiceID::new(args.service_id.clone());
    let gtfs = GTFS::load(&args.gtfs, &service_id, timer)?;
    let opts = IndexOptions {
        service_id,
        reference_trip: TripName::new(args.reference_trip.clone()),
        strip_from_stop_names: args.strip_stop_name.clone(),
    };
    let index = ScheduleIndex::new(&gtfs, &opts)?;
    index.write_to_dir(out)?;

    // The reference trip's shape is the best guess for the route geometry
    let reference = gtfs.select_reference_trip(&opts.reference_trip)?;
    match gtfs.shape_for_trip(reference) {
        Some(points) => {
            let route = RouteGeometry::new(points.clone())?;
            route.write_points(out.join(POINTS))?;
            info!("Wrote the route geometry from shape {:?}", reference.shape_id);
        }
        None => {
            info!(
                "Reference trip {} has no shape; pass --route when reconciling",
                reference.trip_id
            );
        }
    }
    Ok(index)
}

fn reconcile(
    index: &ScheduleIndex,
    args: &RealtimeArgs,
    out: &Path,
    timer: &mut Timer,
) -> Result<()> {
    let route_path = args.route.clone().unwrap_or_else(|| out.join(POINTS));
    if !route_path.exists() {
        bail!(
            "No route geometry at {}; pass --route or use a GTFS feed with shapes",
            route_path.display()
        );
    }
    let route = RouteGeometry::load(&route_path)?;

    let (results, mut report) = model::reconcile_corpus(index, &route, &args.snapshots, timer)?;
    report.schedule_warnings = index.warnings.clone();

    model::write_json(out.join(REALTIME), &results)?;
    report.write_json(out.join(REPORT))?;
    report.log_summary();
    info!("{} trips observed", results.len());
    Ok(())
}
