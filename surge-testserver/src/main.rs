use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut options = surge_testserver::TestServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--reject-every" => {
                let n = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--reject-every requires a positive integer"))?;
                options.reject_every = Some(n.parse()?);
            }
            "--metrics-interval-ms" => {
                let ms = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--metrics-interval-ms requires a positive integer")
                })?;
                options.metrics_interval = Duration::from_millis(ms.parse()?);
            }
            "--stalled" => options.processing = surge_testserver::Processing::Stalled,
            "--no-metrics" => options.metrics_enabled = false,
            "-h" | "--help" => {
                eprintln!(
                    "surge-testserver\n\nUSAGE:\n  surge-testserver [--bind 127.0.0.1:0] [--reject-every N] [--metrics-interval-ms MS] [--stalled] [--no-metrics]\n\nOUTPUT:\n  Prints INGEST_URL=<url> and METRICS_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let stats = surge_testserver::TestServerStats::default();
    let app = surge_testserver::router(stats, options);

    let urls = surge_testserver::TestServerUrls::new(format!("http://{addr}"));
    println!("INGEST_URL={}", urls.events);
    println!("METRICS_URL={}", urls.metrics_stream);

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;
    Ok(())
}
