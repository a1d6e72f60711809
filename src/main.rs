use actix_cors::Cors;
use actix_web::{http::header, middleware::{DefaultHeaders, Logger}, web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tubox_backend::{config::Config, middleware::AdminAreaGate, routes, tasks, AppState};

/// A simple handler for the root URL when no frontend build is served.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "tubox_server", author, version, about = "Starts the tubox portfolio backend.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: Failed to load or parse configuration: {}", e);
            std::process::exit(1);
        }
    };

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));
    for warning in config.startup_warnings() {
        log::warn!("{}", warning);
    }

    fs::create_dir_all(config.blog_dir())?;
    fs::create_dir_all(config.uploads_root())?;

    let app_state = match AppState::from_config(&config) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("FATAL: Could not set up the HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    tasks::spawn_background_tasks(app_state.clone(), &config);

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let app = App::new()
            .wrap(AdminAreaGate)
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(app_state.clone())
            .configure(routes::config_api);

        // The frontend build, when configured, is served for everything else.
        match &config.static_path {
            Some(static_path) => app.service(actix_files::Files::new("/", static_path).index_file("index.html")),
            None => app.route("/", web::get().to(root_handler)),
        }
    })
    .bind(server_address)?
    .run()
    .await
}
