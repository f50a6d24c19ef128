//! CSV loading and export for historical race results

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::data::loader::validate_results;
use crate::error::{PredictorError, Result};
use crate::models::{RaceResult, Weather};

/// Column order of the results file
pub const RESULT_COLUMNS: [&str; 12] = [
    "race_id",
    "year",
    "track",
    "driver",
    "team",
    "grid_position",
    "finish_position",
    "points",
    "fastest_lap",
    "dnf",
    "weather",
    "temperature",
];

/// Load race results from a CSV file
///
/// Rows are returned ordered by race id then driver. An empty
/// `finish_position` cell is read as an unclassified result; any other empty
/// or unparsable cell is an error.
pub fn load_results_csv<P: AsRef<Path>>(csv_path: P) -> Result<Vec<RaceResult>> {
    let csv_path = csv_path.as_ref();
    if !csv_path.is_file() {
        return Err(PredictorError::DataUnavailable(format!(
            "results file not found: {:?}",
            csv_path
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(csv_path.to_path_buf()))?
        .finish()?;

    let mut results = dataframe_to_results(&df)?;
    results.sort_by(|a, b| a.race_id.cmp(&b.race_id).then_with(|| a.driver.cmp(&b.driver)));
    validate_results(&results)?;

    info!("Loaded {} race results from {:?}", results.len(), csv_path);
    Ok(results)
}

/// Write race results to a CSV file
pub fn write_results_csv<P: AsRef<Path>>(results: &[RaceResult], csv_path: P) -> Result<()> {
    let mut df = results_to_dataframe(results)?;
    let csv_path = csv_path.as_ref();
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(csv_path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;

    info!("Wrote {} race results to {:?}", results.len(), csv_path);
    Ok(())
}

/// Convert a results DataFrame into RaceResult rows
fn dataframe_to_results(df: &DataFrame) -> Result<Vec<RaceResult>> {
    let race_col = int_column(df, "race_id")?;
    let year_col = int_column(df, "year")?;
    let track_col = df.column("track")?.str()?;
    let driver_col = df.column("driver")?.str()?;
    let team_col = df.column("team")?.str()?;
    let grid_col = int_column(df, "grid_position")?;
    let finish_col = int_column(df, "finish_position")?;
    let points_col = float_column(df, "points")?;
    let fastest_col = bool_column(df, "fastest_lap")?;
    let dnf_col = bool_column(df, "dnf")?;
    let weather_col = df.column("weather")?.str()?;
    let temp_col = float_column(df, "temperature")?;

    let mut results = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        let row = i + 1;
        let missing = |name: &str| {
            PredictorError::InvalidRecord(format!("row {}: missing value for {}", row, name))
        };

        let weather_label = weather_col.get(i).ok_or_else(|| missing("weather"))?;
        let weather = Weather::parse(weather_label).ok_or_else(|| {
            PredictorError::InvalidRecord(format!(
                "row {}: unknown weather {:?}",
                row, weather_label
            ))
        })?;

        let finish_position: Option<u8> = match finish_col.get(i) {
            Some(p) => Some(narrow(p, row, "finish_position")?),
            None => None,
        };

        let race_id = race_col.get(i).ok_or_else(|| missing("race_id"))?;
        let year = year_col.get(i).ok_or_else(|| missing("year"))?;

        results.push(RaceResult {
            race_id: narrow(race_id, row, "race_id")?,
            year: narrow(year, row, "year")?,
            track: track_col.get(i).ok_or_else(|| missing("track"))?.to_string(),
            driver: driver_col.get(i).ok_or_else(|| missing("driver"))?.to_string(),
            team: team_col.get(i).ok_or_else(|| missing("team"))?.to_string(),
            grid_position: narrow(
                grid_col.get(i).ok_or_else(|| missing("grid_position"))?,
                row,
                "grid_position",
            )?,
            finish_position,
            points: points_col.get(i).ok_or_else(|| missing("points"))?,
            fastest_lap: fastest_col.get(i).ok_or_else(|| missing("fastest_lap"))?,
            dnf: dnf_col.get(i).ok_or_else(|| missing("dnf"))?,
            weather,
            temperature: temp_col.get(i).ok_or_else(|| missing("temperature"))?,
        });
    }

    Ok(results)
}

fn results_to_dataframe(results: &[RaceResult]) -> Result<DataFrame> {
    let race_ids: Vec<u32> = results.iter().map(|r| r.race_id).collect();
    let years: Vec<u32> = results.iter().map(|r| r.year as u32).collect();
    let tracks: Vec<&str> = results.iter().map(|r| r.track.as_str()).collect();
    let drivers: Vec<&str> = results.iter().map(|r| r.driver.as_str()).collect();
    let teams: Vec<&str> = results.iter().map(|r| r.team.as_str()).collect();
    let grid: Vec<u32> = results.iter().map(|r| r.grid_position as u32).collect();
    let finish: Vec<Option<u32>> = results
        .iter()
        .map(|r| r.finish_position.map(|p| p as u32))
        .collect();
    let points: Vec<f64> = results.iter().map(|r| r.points).collect();
    let fastest: Vec<bool> = results.iter().map(|r| r.fastest_lap).collect();
    let dnf: Vec<bool> = results.iter().map(|r| r.dnf).collect();
    let weather: Vec<&str> = results.iter().map(|r| r.weather.as_str()).collect();
    let temperature: Vec<f64> = results.iter().map(|r| r.temperature).collect();

    let df = DataFrame::new(vec![
        Series::new("race_id", race_ids),
        Series::new("year", years),
        Series::new("track", tracks),
        Series::new("driver", drivers),
        Series::new("team", teams),
        Series::new("grid_position", grid),
        Series::new("finish_position", finish),
        Series::new("points", points),
        Series::new("fastest_lap", fastest),
        Series::new("dnf", dnf),
        Series::new("weather", weather),
        Series::new("temperature", temperature),
    ])?;

    Ok(df)
}

/// Integer column; text must parse and floats must hold whole numbers
fn int_column(df: &DataFrame, name: &str) -> PolarsResult<Int64Chunked> {
    let column = df.column(name)?;
    if column.dtype().is_float() {
        let values = column.strict_cast(&DataType::Float64)?;
        if values.f64()?.into_iter().flatten().any(|v| v.fract() != 0.0) {
            return Err(PolarsError::ComputeError(
                format!("column {} holds non-integer values", name).into(),
            ));
        }
    }
    Ok(column.strict_cast(&DataType::Int64)?.i64()?.clone())
}

fn float_column(df: &DataFrame, name: &str) -> PolarsResult<Float64Chunked> {
    Ok(df.column(name)?.strict_cast(&DataType::Float64)?.f64()?.clone())
}

/// Accepts either boolean or 0/1 integer columns
fn bool_column(df: &DataFrame, name: &str) -> PolarsResult<BooleanChunked> {
    let column = df.column(name)?;
    if column.dtype().is_integer() {
        let values = column.strict_cast(&DataType::Int64)?;
        if values.i64()?.into_iter().flatten().any(|v| v != 0 && v != 1) {
            return Err(PolarsError::ComputeError(
                format!("column {} holds values other than 0 and 1", name).into(),
            ));
        }
    }
    Ok(column.strict_cast(&DataType::Boolean)?.bool()?.clone())
}

/// Narrow an integer cell, reporting overflow as an invalid record
fn narrow<T: TryFrom<i64>>(value: i64, row: usize, name: &str) -> Result<T> {
    T::try_from(value).map_err(|_| {
        PredictorError::InvalidRecord(format!("row {}: {} {} out of range", row, name, value))
    })
}
