use std::fs;
use std::path::Path;

use foundation::build::{self, BuildOptions};
use foundation::config::Config;
use foundation::error::BuildError;
use foundation::ErrorCategory;
use rusqlite::Connection;

const CONFIG: &str = r#"
[paths]
data_dir = "data"
db_file = "out/foundation.db"

[logging]
json_file = false

[[tables]]
name = "schools"
primary_key = ["school_id"]
columns = [
  { name = "school_id", type = "integer", nullable = false },
  { name = "name", type = "text" },
  { name = "psgc_region_id", type = "text" },
  { name = "num_students", type = "integer" },
]

[[extractors]]
name = "region_names"
kind = "yaml"
path = "regions.yml"
key = "region_names"

[[extractors]]
name = "schools"
kind = "csv"
path = "schools.csv"
depends_on = ["region_names"]
"#;

const REGIONS: &str = r#"
region_names:
  - psgc_region_id: "0100000000"
    roman: I
    common: Ilocos
  - psgc_region_id: "1300000000"
    roman: NCR
    location: Metro Manila
"#;

fn workspace(schools_csv: &str) -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("regions.yml"), REGIONS).unwrap();
    fs::write(data.join("schools.csv"), schools_csv).unwrap();
    let config_path = dir.path().join("foundation.toml");
    fs::write(&config_path, CONFIG).unwrap();
    let config = Config::from_file(&config_path).unwrap();
    (dir, config)
}

fn count(db: &Path, table: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn build_writes_every_validated_table() {
    let (dir, config) = workspace(
        "school_id,name,psgc_region_id,num_students\n\
         100001,Rizal ES,0100000000,250\n\
         100002,Mabini HS,1300000000,\n",
    );

    let summary = build::build(&config, &BuildOptions::default()).unwrap();
    assert_eq!(summary.order, vec!["region_names", "schools"]);
    assert_eq!(summary.total_rows(), 4);
    let db = dir.path().join("out").join("foundation.db");
    assert_eq!(summary.database.as_deref(), Some(db.as_path()));

    assert_eq!(count(&db, "region_names"), 2);
    assert_eq!(count(&db, "schools"), 2);
    let conn = Connection::open(&db).unwrap();
    let students: Option<i64> = conn
        .query_row(
            "SELECT num_students FROM schools WHERE school_id = 100001",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(students, Some(250));
}

#[test]
fn unchanged_inputs_give_identical_fingerprints() {
    let csv = "school_id,name,psgc_region_id,num_students\n100001,Rizal ES,0100000000,250\n";
    let (_dir, config) = workspace(csv);
    let options = BuildOptions {
        db: None,
        dry_run: true,
    };
    let first = build::build(&config, &options).unwrap();
    let second = build::build(&config, &options).unwrap();
    assert!(first.database.is_none());
    assert_ne!(first.run_id, second.run_id);
    let prints = |s: &build::BuildSummary| {
        s.tables
            .iter()
            .map(|t| t.fingerprint.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(prints(&first), prints(&second));
}

#[test]
fn contract_failure_leaves_the_database_untouched() {
    let (dir, config) = workspace(
        "school_id,name,psgc_region_id,num_students\n100001,Rizal ES,0100000000,abc\n",
    );
    let err = build::build(&config, &BuildOptions::default()).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    match &err {
        BuildError::Pipeline(e) => {
            assert_eq!(e.category(), ErrorCategory::ContractViolation);
            assert_eq!(e.extractor(), Some("schools"));
            assert_eq!(e.validation_failure().unwrap().columns(), vec!["num_students"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("out").join("foundation.db").exists());
}

#[test]
fn missing_source_file_is_an_extraction_failure() {
    let (dir, config) = workspace("school_id\n");
    fs::remove_file(dir.path().join("data").join("schools.csv")).unwrap();
    let err = build::build(&config, &BuildOptions::default()).unwrap_err();
    assert_eq!(err.category_label(), "extraction");
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("schools.csv"), "{err}");
}

#[test]
fn plan_lists_extractors_in_run_order() {
    let (_dir, config) = workspace("school_id\n");
    let plan = build::plan(&config).unwrap();
    let names: Vec<&str> = plan.iter().map(|p| p.extractor.as_str()).collect();
    assert_eq!(names, vec!["region_names", "schools"]);
    assert_eq!(plan[1].depends_on, vec!["region_names"]);
}

#[test]
fn unknown_dependency_is_a_configuration_error() {
    let (_dir, mut config) = workspace("school_id\n");
    config.extractors[1].depends_on.push("enrollment".into());
    let err = build::plan(&config).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("enrollment"));
}

#[test]
fn contracts_include_builtins_and_configured_tables() {
    let (_dir, config) = workspace("school_id\n");
    let names: Vec<String> = build::contracts(&config)
        .unwrap()
        .into_iter()
        .map(|c| c.table_name)
        .collect();
    assert!(names.contains(&"psgc".to_string()));
    assert!(names.contains(&"schools".to_string()));
    assert_eq!(names.last().map(String::as_str), Some("schools"));
}
