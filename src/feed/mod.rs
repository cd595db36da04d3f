mod config;
pub mod models;

pub use config::*;
use models::*;
use serde::de::DeserializeOwned;
use std::{
    fs::File,
    io::{self, Read, Seek},
    path::Path,
};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Feed is missing required table: {0}")]
    MissingTable(String),
}

/// A zipped transit feed archive. Tables are streamed record by record so the
/// stop-times file, by far the largest, never has to be resident; callers
/// aggregate into per-window maps as rows arrive.
///
/// Generic over the archive reader so tests can drive it from an in-memory
/// `Cursor` built with `zip::ZipWriter`.
pub struct Feed<R> {
    archive: ZipArchive<R>,
    config: Config,
}

impl Feed<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> Feed<R> {
    pub fn from_reader(reader: R) -> Result<Self, Error> {
        let archive = ZipArchive::new(reader)?;
        Ok(Self {
            archive,
            config: Config::default(),
        })
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Verifies that `stops`, `trips` and `stop_times` are all present.
    /// `routes` and `calendar` are optional; their streams are no-ops when
    /// the table is absent.
    pub fn require_tables(&self) -> Result<(), Error> {
        let required = [
            self.config.stops_path.clone(),
            self.config.trips_path.clone(),
            self.config.stop_times_path.clone(),
        ];
        for name in required {
            if !self.has_table(&name) {
                return Err(Error::MissingTable(name));
            }
        }
        Ok(())
    }

    pub fn has_calendar(&self) -> bool {
        self.archive
            .index_for_name(&self.config.calendar_path)
            .is_some()
    }

    pub fn stream_stops<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut(StopRow),
    {
        let name = self.config.stops_path.clone();
        stream_table(&mut self.archive, &name, f)
    }

    pub fn stream_trips<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut(TripRow),
    {
        let name = self.config.trips_path.clone();
        stream_table(&mut self.archive, &name, f)
    }

    pub fn stream_stop_times<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut(StopTimeRow),
    {
        let name = self.config.stop_times_path.clone();
        stream_table(&mut self.archive, &name, f)
    }

    pub fn stream_routes<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut(RouteRow),
    {
        let name = self.config.routes_path.clone();
        if !self.has_table(&name) {
            return Ok(());
        }
        stream_table(&mut self.archive, &name, f)
    }

    pub fn stream_calendar<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnMut(CalendarRow),
    {
        let name = self.config.calendar_path.clone();
        if !self.has_table(&name) {
            return Ok(());
        }
        stream_table(&mut self.archive, &name, f)
    }
}

fn stream_table<R, T, F>(
    archive: &mut ZipArchive<R>,
    file_name: &str,
    mut f: F,
) -> Result<(), Error>
where
    R: Read + Seek,
    T: DeserializeOwned,
    F: FnMut(T),
{
    let index = archive
        .index_for_name(file_name)
        .ok_or_else(|| Error::MissingTable(file_name.to_string()))?;
    let file = archive.by_index(index)?;
    let mut reader = csv::Reader::from_reader(file);
    for (i, result) in reader.deserialize().enumerate() {
        match result {
            Ok(record) => f(record),
            // Ragged or undecodable rows are endemic to real feeds. A bad
            // row never yields a false edge, so it is dropped here.
            Err(err) => debug!("{file_name}: dropped row {i}: {err}"),
        }
    }
    Ok(())
}
