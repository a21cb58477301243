//! Pooled versus unpooled insert benchmark.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use cistern_pool::{Connection, Connector, Pool, PoolConfig};
use log::{debug, info, warn};

use crate::sim::SimConnector;

/// Parameters for one benchmark run
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Worker threads issuing inserts
    pub threads: usize,

    /// Inserts per worker thread
    pub iterations: usize,

    /// Cost of opening a simulated session
    pub connect_latency: Duration,

    /// Cost of one simulated statement
    pub statement_latency: Duration,
}

/// Timings of both runs
#[derive(Debug, Clone)]
pub struct BenchReport {
    /// Wall time with one fresh session per insert
    pub unpooled: Duration,

    /// Sessions opened by the unpooled run
    pub unpooled_sessions: u64,

    /// Wall time with sessions borrowed from the pool
    pub pooled: Duration,

    /// Sessions opened by the pooled run
    pub pooled_sessions: u64,

    /// Inserts skipped because acquire timed out
    pub pooled_skipped: usize,

    /// Rows written by the pooled run
    pub pooled_rows: usize,
}

fn insert_statement(worker: usize, i: usize) -> String {
    format!(
        "insert into user(id, name) values({}, 'worker-{}')",
        i, worker
    )
}

/// Each insert opens, uses and closes its own session
pub fn run_unpooled(config: &PoolConfig, options: &BenchOptions) -> Result<(Duration, u64)> {
    let connector = Arc::new(SimConnector::new(
        options.connect_latency,
        options.statement_latency,
    ));
    let config = Arc::new(config.clone());

    let started = Instant::now();
    let workers: Vec<_> = (0..options.threads)
        .map(|worker| {
            let connector = Arc::clone(&connector);
            let config = Arc::clone(&config);
            let iterations = options.iterations;
            thread::spawn(move || -> Result<()> {
                for i in 0..iterations {
                    let mut conn = connector.connect(&config)?;
                    conn.execute(&insert_statement(worker, i))?;
                    conn.close();
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow!("unpooled worker panicked"))??;
    }
    let elapsed = started.elapsed();

    debug!("Unpooled run finished in {:?}", elapsed);
    Ok((elapsed, connector.sessions_opened()))
}

/// Each insert borrows a session from one shared pool
pub fn run_pooled(
    config: &PoolConfig,
    options: &BenchOptions,
) -> Result<(Duration, u64, usize, usize)> {
    let connector = SimConnector::new(options.connect_latency, options.statement_latency);
    let pool = Arc::new(
        Pool::new(config.clone(), connector.clone()).context("failed to start connection pool")?,
    );

    let started = Instant::now();
    let workers: Vec<_> = (0..options.threads)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            let iterations = options.iterations;
            thread::spawn(move || -> Result<usize> {
                let mut skipped = 0;
                for i in 0..iterations {
                    let mut conn = match pool.acquire() {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Worker {} skipping insert {}: {}", worker, i, e);
                            skipped += 1;
                            continue;
                        }
                    };
                    conn.execute(&insert_statement(worker, i))?;
                }
                Ok(skipped)
            })
        })
        .collect();

    let mut skipped = 0;
    for worker in workers {
        skipped += worker
            .join()
            .map_err(|_| anyhow!("pooled worker panicked"))??;
    }
    let elapsed = started.elapsed();

    let stats = pool.stats();
    debug!("Pooled run finished in {:?}: {:?}", elapsed, stats);
    pool.shutdown();

    Ok((elapsed, connector.sessions_opened(), skipped, connector.row_count()))
}

/// Run both variants back to back
pub fn run(config: &PoolConfig, options: &BenchOptions) -> Result<BenchReport> {
    info!(
        "Benchmarking {} threads x {} inserts (connect {:?}, statement {:?})",
        options.threads, options.iterations, options.connect_latency, options.statement_latency
    );

    let (unpooled, unpooled_sessions) = run_unpooled(config, options)?;
    let (pooled, pooled_sessions, pooled_skipped, pooled_rows) = run_pooled(config, options)?;

    Ok(BenchReport {
        unpooled,
        unpooled_sessions,
        pooled,
        pooled_sessions,
        pooled_skipped,
        pooled_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(threads: usize, iterations: usize) -> BenchOptions {
        BenchOptions {
            threads,
            iterations,
            connect_latency: Duration::from_millis(0),
            statement_latency: Duration::from_micros(0),
        }
    }

    fn small_pool() -> PoolConfig {
        PoolConfig {
            min_size: 2,
            max_size: 4,
            acquire_timeout_ms: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_unpooled_opens_one_session_per_insert() {
        let (_, sessions) = run_unpooled(&small_pool(), &options(3, 10)).unwrap();
        assert_eq!(sessions, 30);
    }

    #[test]
    fn test_pooled_reuses_sessions() {
        let (_, sessions, skipped, rows) = run_pooled(&small_pool(), &options(3, 10)).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(rows, 30);
        assert!(sessions <= 4);
    }

    #[test]
    fn test_report() {
        let report = run(&small_pool(), &options(2, 5)).unwrap();
        assert_eq!(report.unpooled_sessions, 10);
        assert_eq!(report.pooled_rows + report.pooled_skipped, 10);
    }

    #[test]
    fn test_unreachable_backend_fails_unpooled_run() {
        let config = PoolConfig {
            address: String::new(),
            ..small_pool()
        };
        assert!(run_unpooled(&config, &options(1, 1)).is_err());
    }
}
