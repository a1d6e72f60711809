use bcrypt::{hash, DEFAULT_COST};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tubox_backend::config::Config;
use tubox_backend::helper::sync_helpers::sync_remote_galleries;
use tubox_backend::models::db_operations::blog_file_operations;
use tubox_backend::models::db_operations::remote_operations::RemoteHost;
use tubox_backend::setup::dir_setup;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "Setup and maintenance commands for the tubox backend.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Dirs {
        #[command(subcommand)]
        action: DirsAction,
    },
    Blog {
        #[command(subcommand)]
        action: BlogAction,
    },
    Galleries {
        #[command(subcommand)]
        action: GalleriesAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DirsAction {
    /// Create the data, cache and uploads directories.
    Setup,
}

#[derive(Subcommand, Debug)]
enum BlogAction {
    /// Report on index.json without changing it.
    Check,
    /// Collapse duplicate index entries.
    Cleanup,
    /// Add entries for orphan post files and drop entries without a file.
    Repair,
}

#[derive(Subcommand, Debug)]
enum GalleriesAction {
    /// Pull the remote file listing into the local gallery cache.
    Sync,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Print a bcrypt hash for ADMIN_PASSWORD_HASH.
    HashPassword {
        #[arg(long)]
        password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ FATAL: Failed to load or parse configuration: {}", e);
            process::exit(1);
        }
    };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Dirs { action: DirsAction::Setup } => setup_dirs(&config),
        Commands::Blog { action } => match action {
            BlogAction::Check => check_blog_index(&config),
            BlogAction::Cleanup => cleanup_blog_index(&config),
            BlogAction::Repair => repair_blog_index(&config),
        },
        Commands::Galleries { action: GalleriesAction::Sync } => sync_galleries(&config),
        Commands::Admin { action: AdminAction::HashPassword { password } } => hash_password(password),
    }
}

fn setup_dirs(config: &Config) {
    println!("\nSetting up directories below '{}' and '{}'...", config.data_path, config.uploads_path);
    match dir_setup::setup_directories(config) {
        Ok(created) if created.is_empty() => println!("ℹ️ Everything already exists. Nothing to do."),
        Ok(created) => println!("✅ Created {} path(s).", created.len()),
        Err(e) => {
            eprintln!("❌ Error setting up directories: {}", e);
            process::exit(1);
        }
    }
}

fn check_blog_index(config: &Config) {
    let report = blog_file_operations::check_index(&config.blog_dir());
    println!("Blog index: {}", report.path);
    println!("- exists: {}", report.exists);
    println!("- valid:  {}", report.valid);
    if let Some(shape) = report.shape {
        println!("- shape:  {:?}", shape);
    }
    println!("- posts:  {}", report.post_count);
    if let Some(error) = report.error {
        eprintln!("❌ {}", error);
        process::exit(1);
    }
}

fn cleanup_blog_index(config: &Config) {
    match blog_file_operations::cleanup_index(&config.blog_dir()) {
        Ok(report) => println!(
            "✅ Blog index cleaned: {} -> {} entries ({} removed).",
            report.original_count, report.cleaned_count, report.removed_count
        ),
        Err(e) => {
            eprintln!("❌ Error cleaning the blog index: {}", e);
            process::exit(1);
        }
    }
}

fn repair_blog_index(config: &Config) {
    match blog_file_operations::repair_index(&config.blog_dir()) {
        Ok(report) => {
            for slug in &report.added_slugs {
                println!("+ {}", slug);
            }
            for slug in &report.removed_slugs {
                println!("- {}", slug);
            }
            println!("✅ Blog index repaired. {} post(s) indexed.", report.post_count);
        }
        Err(e) => {
            eprintln!("❌ Error repairing the blog index: {}", e);
            process::exit(1);
        }
    }
}

fn sync_galleries(config: &Config) {
    let host = match RemoteHost::new(config.remote_timeout_secs) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("❌ Error creating the HTTP client: {}", e);
            process::exit(1);
        }
    };
    let result = actix_web::rt::System::new().block_on(sync_remote_galleries(
        &host,
        config.server_base_url.as_deref(),
        &config.gallery_cache_path(),
    ));
    match result {
        Ok(report) => println!(
            "✅ Synced {} galleries ({} files) into '{}'.",
            report.gallery_count, report.file_count, report.cache_path
        ),
        Err(e) => {
            eprintln!("❌ Gallery sync failed: {}", e);
            process::exit(1);
        }
    }
}

fn hash_password(password: &str) {
    match hash(password, DEFAULT_COST) {
        Ok(hashed) => {
            // Single quotes keep dotenv from expanding the `$` segments.
            println!("Add this line to your .env file:");
            println!("ADMIN_PASSWORD_HASH='{}'", hashed);
        }
        Err(e) => {
            eprintln!("❌ Error hashing password: {}", e);
            process::exit(1);
        }
    }
}
