use anyhow::Result;
use parallel_pool::{errors::print_task_errors, run, Config, StreamingPool};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};


fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parallel_pool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "configuration loaded");

    let now = Instant::now();
    let inputs: Vec<u64> = (1..=5).collect();
    let (results, errors) = run(2, inputs, |x: &u64| {
        if x % 2 == 0 {
            Ok(x * x)
        } else {
            Err("odd")
        }
    });
    println!("batch results: {:?}", results);
    print_task_errors(&errors);
    println!("batch elapsed: {:?}", now.elapsed());

    let now = Instant::now();
    let sum = Arc::new(AtomicUsize::new(0));
    let handler_sum = Arc::clone(&sum);
    let mut pool = StreamingPool::with_config(
        config,
        |x: usize| x * 2,
        move |_index: usize, doubled: usize| {
            handler_sum.fetch_add(doubled, Ordering::Relaxed);
        },
    );
    pool.start()?;
    for i in 0..100_000 {
        pool.submit(i)?;
    }
    pool.stop();
    println!(
        "stream sum: {}, metrics: {:?}, elapsed: {:?}",
        sum.load(Ordering::Relaxed),
        pool.metrics(),
        now.elapsed()
    );
    Ok(())
}
