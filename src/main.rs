use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use turnstile::api;
use turnstile::logger::*;
use turnstile::server::*;
use turnstile::settings::*;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
        format: project_settings.log.format,
    };
    logger.reload_from_config(&logger_config)?;

    let address: SocketAddr = project_settings.http.address.parse()?;
    if let Some((cert_path, key_path)) = project_settings.http.tls() {
        for path in [cert_path, key_path] {
            if !std::fs::metadata(path)?.is_file() {
                return Err(anyhow::anyhow!("TLS file is not a regular file: {:?}", path));
            }
        }
    }

    let server = Arc::new(Server::try_new(&project_settings).await?);
    let routes = api::routes(server.clone());

    let origins = &project_settings.http.allowed_origins;
    if origins.is_empty() {
        serve(routes.recover(api::recover_error), address, &project_settings.http).await;
    } else {
        let cors = warp::cors()
            .allow_origins(origins.iter().map(String::as_str))
            .allow_credentials(true)
            .allow_methods(vec!["GET", "POST", "OPTIONS"])
            .allow_headers(vec!["Accept", "Authorization", "Content-Type"]);
        serve(
            routes.with(cors).recover(api::recover_error),
            address,
            &project_settings.http,
        )
        .await;
    }

    let shutdown_timeout = std::time::Duration::from_secs(30);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => tracing::info!("server shutdown successfully"),
        Err(_) => tracing::error!("server shutdown timed out"),
    }

    Ok(())
}

async fn serve<F, R>(filter: F, address: SocketAddr, http: &Http)
where
    F: Filter<Extract = (R,), Error = Infallible> + Clone + Send + Sync + 'static,
    R: warp::Reply,
{
    let shutdown = async {
        signal::ctrl_c().await.expect("Could not register SIGINT");
    };

    match http.tls() {
        Some((cert_path, key_path)) => {
            let (bound, running) = warp::serve(filter)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown);
            info!(%bound, "listening (tls)");
            running.await;
        }
        None => {
            let (bound, running) = warp::serve(filter).bind_with_graceful_shutdown(address, shutdown);
            info!(%bound, "listening");
            running.await;
        }
    }
}
