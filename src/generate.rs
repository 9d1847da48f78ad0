use std::io::{self, Write};
use std::panic;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};

pub const COLDEST: f64 = -99.9;
pub const HOTTEST: f64 = 99.9;
pub const STD_DEV: f64 = 10.0;

/// Rows between two progress callbacks.
pub const PROGRESS_STEP: u64 = 10_000;

/// Rows each generator renders per round of [`write_rows_parallel`].
pub const BATCH_ROWS: u64 = 1 << 16;

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub mean: f64,
}

impl Station {
    pub fn new(name: impl Into<String>, mean: f64) -> Self {
        Self {
            name: name.into(),
            mean,
        }
    }
}

const BUILTIN_STATIONS: &[(&str, f64)] = &[
    ("Abha", 18.0),
    ("Abidjan", 26.0),
    ("Accra", 26.4),
    ("Addis Ababa", 16.0),
    ("Adelaide", 17.3),
    ("Albuquerque", 14.0),
    ("Alexandria", 20.0),
    ("Amsterdam", 10.2),
    ("Anchorage", 2.8),
    ("Athens", 19.2),
    ("Baghdad", 22.77),
    ("Bangkok", 28.6),
    ("Barcelona", 18.2),
    ("Beijing", 12.9),
    ("Berlin", 10.3),
    ("Bogotá", 14.0),
    ("Boston", 10.9),
    ("Bratislava", 10.5),
    ("Cairo", 21.4),
    ("Cape Town", 16.2),
    ("Chicago", 9.8),
    ("Dakar", 24.0),
    ("Dubai", 26.9),
    ("Dublin", 9.8),
    ("Hanoi", 23.6),
    ("Helsinki", 5.9),
    ("Istanbul", 13.9),
    ("Jakarta", 26.7),
    ("Kinshasa", 25.3),
    ("Lagos", 26.8),
    ("Lima", 19.9),
    ("London", 11.3),
    ("Madrid", 15.0),
    ("Mexico City", 17.5),
    ("Moscow", 5.8),
    ("Mumbai", 27.1),
    ("Nairobi", 17.8),
    ("Oslo", 5.7),
    ("Paris", 12.3),
    ("Reykjavík", 4.3),
    ("Rome", 15.2),
    ("Seoul", 12.5),
    ("Singapore", 27.0),
    ("St. John's", 5.0),
    ("Sydney", 17.7),
    ("Tokyo", 15.4),
    ("Toronto", 9.4),
    ("Vancouver", 10.4),
    ("Yakutsk", -8.8),
    ("Zürich", 9.3),
];

/// A sample of well-known stations and their yearly mean temperatures.
pub fn builtin_stations() -> Vec<Station> {
    BUILTIN_STATIONS
        .iter()
        .map(|&(name, mean)| Station::new(name, mean))
        .collect()
}

/// Draws `<station>;<value>` records around each station's mean.
pub struct Generator {
    stations: Vec<(Station, Normal<f64>)>,
    rng: StdRng,
}

impl Generator {
    /// `seed` makes the output reproducible; without it the rng is seeded
    /// from the OS.
    pub fn new(stations: Vec<Station>, seed: Option<u64>) -> Result<Self, NormalError> {
        let stations = stations
            .into_iter()
            .map(|station| Normal::new(station.mean, STD_DEV).map(|normal| (station, normal)))
            .collect::<Result<Vec<_>, _>>()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { stations, rng })
    }

    /// Picks a station and samples a value for it, clamped to the value range.
    /// `None` when the generator has no stations.
    pub fn sample(&mut self) -> Option<(&str, f64)> {
        if self.stations.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.stations.len());
        let (station, normal) = &self.stations[index];
        let value = normal.sample(&mut self.rng).clamp(COLDEST, HOTTEST);
        Some((station.name.as_str(), value))
    }

    /// Writes `rows` records. `progress` receives the number of rows written
    /// every [`PROGRESS_STEP`] rows.
    pub fn write_rows(
        &mut self,
        writer: &mut impl Write,
        rows: u64,
        mut progress: impl FnMut(u64),
    ) -> io::Result<()> {
        for i in 0..rows {
            let Some((station, value)) = self.sample() else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "no stations to sample from",
                ));
            };
            writeln!(writer, "{station};{value:.1}")?;
            if i % PROGRESS_STEP == 0 {
                progress(i);
            }
        }
        progress(rows);
        Ok(())
    }
}

/// One generator per thread. With a seed, generator `i` is seeded with
/// `seed + i`, so the output only depends on the seed and the pool size.
pub fn seeded_pool(
    stations: &[Station],
    seed: Option<u64>,
    size: usize,
) -> Result<Vec<Generator>, NormalError> {
    (0..size as u64)
        .map(|i| Generator::new(stations.to_vec(), seed.map(|seed| seed.wrapping_add(i))))
        .collect()
}

/// Writes `rows` records using every generator of `pool` on its own thread.
///
/// Each round, every generator renders its share of at most [`BATCH_ROWS`]
/// rows into its own buffer; the buffers are then written in pool order.
/// `progress` receives the number of rows written after every round.
pub fn write_rows_parallel(
    pool: &mut [Generator],
    writer: &mut impl Write,
    rows: u64,
    mut progress: impl FnMut(u64),
) -> io::Result<()> {
    if pool.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no generators to write with",
        ));
    }
    let threads = pool.len() as u64;
    let mut buffers = vec![Vec::<u8>::new(); pool.len()];
    let mut written = 0;
    while written < rows {
        let round = (rows - written).min(BATCH_ROWS * threads);
        let share = round.div_ceil(threads);
        thread::scope(|s| {
            let handles: Vec<_> = pool
                .iter_mut()
                .zip(buffers.iter_mut())
                .zip(0..threads)
                .map(|((generator, buffer), i)| {
                    let count = share.min(round.saturating_sub(i * share));
                    s.spawn(move || {
                        buffer.clear();
                        generator.write_rows(buffer, count, |_| {})
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                .collect::<io::Result<()>>()
        })?;
        for buffer in &buffers {
            writer.write_all(buffer)?;
        }
        written += round;
        progress(written);
    }
    Ok(())
}
