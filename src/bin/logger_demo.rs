use session_keeper::logger::*;

fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    let config = LogConfig {
        filter: "session_keeper=trace,info".to_string(),
    };
    logger.reload_from_config(&config)?;
    trace!(target: "session_keeper", "application trace log");
    debug!(target: "session_keeper", "application debug log");
    info!("application info log");

    let bad = LogConfig {
        filter: "session_keeper=[".to_string(),
    };
    println!("Error on invalid filter: {:?}", logger.reload_from_config(&bad).is_err());

    Ok(())
}
