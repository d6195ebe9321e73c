use std::fs;
use std::path::Path;

use zipyield::charts::{ChoroplethMap, GeometryIndex};
use zipyield::config::Config;
use zipyield::data::{DuplicatePolicy, LoaderError, TimeWindow};
use zipyield::output::{write_ranked, ExportColumn};
use zipyield::pipeline::{Pipeline, PipelineError};
use zipyield::report::DataIssue;

const SALES_TSV: &str = "\
period_begin\tperiod_end\tregion\tmedian_sale_price
2022-01-01\t2022-01-31\tZip Code: 90266\t1000000
2022-02-01\t2022-02-28\tZip Code: 90266\t1100000
2021-12-01\t2021-12-31\tZip Code: 90266\t9000000
2022-01-01\t2022-01-31\tZip Code: 00501\t200000
2022-01-01\t2022-01-31\tZip Code: 10017\t100000
2022-01-01\t2022-01-31\tZip Code: 33101\t0
2022-01-01\t2022-01-31\tZip Code: 60601\t150000
2022-01-01\t2022-01-31\tZip Code: n/a\t300000
";

const RENTALS_CSV: &str = "\
RegionID,SizeRank,RegionName,2021-12-31,2022-01-31,2022-02-28
1,0,90266,9000,1700,1700
2,1,501,2000,2000,2000
3,2,10017,1000,1200,1200
4,3,33101,500,900,900
5,4,60601,5000,5000,5000
6,5,77777,1000,1000,1000
";

fn write_inputs(dir: &Path) -> Config {
    let sales = dir.join("sales.tsv000");
    let rentals = dir.join("rentals.csv");
    fs::write(&sales, SALES_TSV).unwrap();
    fs::write(&rentals, RENTALS_CSV).unwrap();

    let mut config = Config::default();
    config.sales.path = sales;
    config.rentals.path = rentals;
    config.export.path = dir.join("out/out.csv");
    config.map.output_path = dir.join("web/index.html");
    config
}

fn read_export(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

#[test]
fn test_end_to_end_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path());

    let out = Pipeline::run(&config).expect("pipeline failed");
    let zips: Vec<String> = out.table.iter().map(|r| r.zip.to_string()).collect();
    // 60601 is above the threshold, 33101 has a zero sale price, 77777 has no sales.
    assert_eq!(zips, vec!["10017", "00501", "90266"]);

    let beach = out.table.iter().find(|r| r.zip.as_str() == "90266").unwrap();
    assert_eq!(beach.sale_price, 1_050_000.0);
    assert_eq!(beach.rental_price, 1700.0);
    assert!((beach.ratio - 1700.0 / 1_050_000.0).abs() < 1e-12);

    assert_eq!(out.report.count(DataIssue::MalformedZip), 1);
    assert_eq!(out.report.count(DataIssue::DivisionByZero), 1);
    assert_eq!(out.report.join.above_threshold, 1);
    assert_eq!(out.report.join.rentals_only, 1);
    assert_eq!(out.report.rental_months, vec!["2022-01-31", "2022-02-28"]);

    let rows = write_ranked(
        &config.export.path,
        &out.table,
        &config.export.options().unwrap(),
    )
    .unwrap();
    assert_eq!(rows, 3);

    let lines = read_export(&config.export.path);
    assert_eq!(lines[0], vec!["RegionName", "RentToSaleRatio"]);
    assert_eq!(lines[1][0], "10017");
    assert_eq!(lines[2][0], "00501");
    assert_eq!(lines[3][0], "90266");
}

#[test]
fn test_ranking_properties() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path());
    let out = Pipeline::run(&config).unwrap();

    for pair in out.table.records().windows(2) {
        assert!(pair[0].ratio >= pair[1].ratio);
    }
    for record in &out.table {
        assert!(record.ratio < config.ratio.threshold);
        assert!(record.sale_price > 0.0);
        assert!((record.ratio - record.rental_price / record.sale_price).abs() < 1e-15);
        assert_eq!(record.zip.as_str().len(), 5);
    }
}

#[test]
fn test_export_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_inputs(dir.path());
    config.export.columns = vec![
        ExportColumn::Zip,
        ExportColumn::SalePrice,
        ExportColumn::RentalPrice,
        ExportColumn::Ratio,
    ];
    let options = config.export.options().unwrap();

    let first = Pipeline::run(&config).unwrap();
    write_ranked(&config.export.path, &first.table, &options).unwrap();
    let before = fs::read(&config.export.path).unwrap();

    let second = Pipeline::run(&config).unwrap();
    write_ranked(&config.export.path, &second.table, &options).unwrap();
    let after = fs::read(&config.export.path).unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_windows_and_duplicate_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_inputs(dir.path());
    fs::write(
        &config.rentals.path,
        "RegionName,2022-01-31,2022-02-28\n90266,1700,1700\n90266,2100,2100\n",
    )
    .unwrap();

    config.rentals.duplicate_policy = DuplicatePolicy::Last;
    config.rentals.window = "2022-02-01..2022-02-28".parse::<TimeWindow>().unwrap();
    config.sales.window = "2022-01".parse::<TimeWindow>().unwrap();

    let out = Pipeline::run(&config).unwrap();
    let beach = out.table.iter().find(|r| r.zip.as_str() == "90266").unwrap();
    assert_eq!(beach.sale_price, 1_000_000.0);
    assert_eq!(beach.rental_price, 2100.0);
    assert_eq!(out.report.rental_months, vec!["2022-02-28"]);
    assert_eq!(out.report.count(DataIssue::DuplicateZip), 1);
}

#[test]
fn test_disjoint_inputs_produce_header_only_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path());
    fs::write(&config.rentals.path, "RegionName,2022-01-31\n99999,1000\n").unwrap();

    let out = Pipeline::run(&config).unwrap();
    assert!(out.table.is_empty());
    assert!(out.report.has_issue(DataIssue::EmptyJoinResult));

    let rows = write_ranked(
        &config.export.path,
        &out.table,
        &config.export.options().unwrap(),
    )
    .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(read_export(&config.export.path).len(), 1);
}

#[test]
fn test_missing_input_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_inputs(dir.path());
    config.rentals.path = dir.path().join("missing.csv");

    match Pipeline::run(&config) {
        Err(PipelineError::Loader(LoaderError::FileNotFound(path))) => {
            assert!(path.ends_with("missing.csv"));
        }
        other => panic!("expected FileNotFound, got {other:?}"),
    }
}

#[test]
fn test_missing_required_column_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path());
    fs::write(&config.rentals.path, "Zip,2022-01-31\n90266,1700\n").unwrap();

    assert!(matches!(
        Pipeline::run(&config),
        Err(PipelineError::Loader(LoaderError::MissingColumn { .. }))
    ));
}

#[test]
fn test_report_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path());
    let out = Pipeline::run(&config).unwrap();

    let path = dir.path().join("reports/run.json");
    out.report.write_json(&path).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["issues"]["malformed_zip"], 1);
    assert_eq!(json["issues"]["division_by_zero"], 1);
    assert_eq!(json["join"]["ranked"], 3);
    assert_eq!(json["ratio_summary"]["count"], 3);
}

#[test]
fn test_map_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path());
    let out = Pipeline::run(&config).unwrap();

    let geometry_path = dir.path().join("zcta.geojson");
    fs::write(
        &geometry_path,
        r#"{
          "type": "FeatureCollection",
          "features": [
            {
              "type": "Feature",
              "properties": { "NAME20": "90266", "GEOID20": "90266" },
              "geometry": {
                "type": "Polygon",
                "coordinates": [[[-118.42, 33.87], [-118.38, 33.87], [-118.38, 33.90], [-118.42, 33.90], [-118.42, 33.87]]]
              }
            },
            {
              "type": "Feature",
              "properties": { "NAME20": "00501", "GEOID20": "00501" },
              "geometry": {
                "type": "Polygon",
                "coordinates": [[[-73.05, 40.81], [-73.04, 40.81], [-73.04, 40.82], [-73.05, 40.82], [-73.05, 40.81]]]
              }
            }
          ]
        }"#,
    )
    .unwrap();

    let geometry = GeometryIndex::load(
        &geometry_path,
        &config.map.join_property,
        &config.map.label_property,
    )
    .unwrap();
    assert_eq!(geometry.len(), 2);

    let options = config.map.options().unwrap();
    let summary =
        ChoroplethMap::write(&config.map.output_path, &out.table, &geometry, &options).unwrap();
    assert_eq!(summary.rendered, 2);
    assert_eq!(summary.missing_geometry, 1);

    let html = fs::read_to_string(&config.map.output_path).unwrap();
    assert!(html.contains("leaflet"));
    assert!(html.contains("\"zip\":\"90266\""));
    assert!(html.contains("\"zip\":\"00501\""));
    assert!(html.contains("0.16% <br> 90266 <br> $1,050,000 <br> $1,700 "));
    assert!(!html.contains("\"zip\":\"10017\""));
}
