//! OSRM integration tests against a real `osrm-routed` container.
//!
//! Opt-in: run with `cargo test -- --ignored` after preparing an MLD dataset
//! (`osrm-extract`, `osrm-partition`, `osrm-customize`) for British Columbia
//! in `$OSRM_DATA_DIR`.

mod fixtures;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use testcontainers::ReuseDirective;
use testcontainers::core::{IntoContainerPort, Mount};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt, TestcontainersError};

use field_router::osrm::{OsrmClient, OsrmConfig};
use field_router::quantifier::RouteQuantifier;
use field_router::traits::{RouteRequest, RouteRequestOptions};
use field_router::{IngestMode, Optimization, Scenario};

use fixtures::*;

const DATASET: &str = "british-columbia-latest.osrm";

fn osrm_container() -> Result<(Container<GenericImage>, String), TestcontainersError> {
    let data_dir = PathBuf::from(env::var("OSRM_DATA_DIR").unwrap_or_else(|_| "osrm-data".to_string()));
    let partition = data_dir.join(DATASET).with_extension("osrm.partition");
    if !partition.exists() {
        return Err(TestcontainersError::other(format!(
            "no prepared dataset at {}",
            partition.display()
        )));
    }
    let mtime = std::fs::metadata(&partition)
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|time| time.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);

    let image = GenericImage::new("osrm/osrm-backend", "latest")
        .with_exposed_port(5000.tcp())
        .with_mount(Mount::bind_mount(data_dir.to_string_lossy().to_string(), "/data"))
        .with_cmd(vec![
            "osrm-routed".to_string(),
            "--algorithm".to_string(),
            "mld".to_string(),
            format!("/data/{DATASET}"),
        ])
        .with_container_name(format!("osrm-bc-mld-{mtime}"))
        .with_startup_timeout(Duration::from_secs(30))
        .with_reuse(ReuseDirective::Always);

    let container = image.start()?;
    let port = container.get_host_port_ipv4(5000.tcp())?;
    Ok((container, format!("http://127.0.0.1:{port}")))
}

fn client(base_url: &str) -> OsrmClient {
    OsrmClient::new(OsrmConfig {
        base_url: base_url.to_string(),
        profile: "car".to_string(),
        timeout_secs: 10,
    })
    .expect("build OSRM client")
}

#[test]
#[ignore = "needs docker and a prepared OSRM dataset in OSRM_DATA_DIR"]
fn osrm_trip_reorders_waypoints() {
    let (container, base_url) = osrm_container().expect("start OSRM container");
    let quantifier = RouteQuantifier::new(Arc::new(client(&base_url)));

    let request = RouteRequest {
        origin: DEPOTS[0].coordinate(),
        destination: DEPOTS[0].coordinate(),
        waypoints: SITES.iter().take(4).map(|site| site.coordinate()).collect(),
        options: RouteRequestOptions {
            traffic_model: None,
            optimize_waypoints: true,
        },
    };

    // osrm-routed may still be loading when the port opens
    let started = Instant::now();
    let quantified = loop {
        match quantifier.quantify(request.clone()) {
            Ok(quantified) => break quantified,
            Err(err) if started.elapsed() < Duration::from_secs(15) => {
                eprintln!("OSRM not ready: {err}");
                std::thread::sleep(Duration::from_millis(500));
            }
            Err(err) => {
                if let Ok(stderr) = container.stderr_to_vec() {
                    eprintln!("OSRM stderr:\n{}", String::from_utf8_lossy(&stderr));
                }
                panic!("OSRM never answered: {err}");
            }
        }
    };

    let mut order = quantified.ordered_waypoint_indices.clone();
    order.sort_unstable();
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert!(quantified.total_distance_meters > 0.0);
    assert!(quantified.total_duration_seconds > 0.0);
    assert!(quantified.decoded_path.points().len() > 2);

    drop(container);
}

#[test]
#[ignore = "needs docker and a prepared OSRM dataset in OSRM_DATA_DIR"]
fn planner_uses_road_metrics() {
    let (container, base_url) = osrm_container().expect("start OSRM container");
    let planner = planner().with_provider(Arc::new(client(&base_url)));
    let lines: Vec<String> = SITES.iter().map(|site| site.as_line()).collect();
    planner
        .ingest_places(&lines.join("\n"), IngestMode::Replace)
        .expect("ingest");
    planner.add_all_to_route().expect("select all");

    let outcome = planner
        .run_optimization(Scenario::Optimize, Some(DEPOTS[0].coordinate()))
        .expect("optimize");
    let Optimization::Applied(result) = outcome else {
        panic!("single run was superseded");
    };
    assert_eq!(result.ordered_place_ids.len(), SITES.len());
    if !result.approximate {
        assert!(result.path.is_some());
        assert!(result.total_distance > 0.0);
    }

    drop(container);
}
