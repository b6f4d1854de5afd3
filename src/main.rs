use anyhow::Context;
use clap::{Parser, Subcommand};
use deb_s3::config::{ConfigFile, GlobalArgs, Settings};
use deb_s3::logging::LoggingArgs;
use deb_s3::storage::Storage;
use deb_s3::{Repository, UploadOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "deb-s3", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload the given package files and update the indices
    Upload {
        #[clap(required = true)]
        /// The .deb files to add
        files: Vec<PathBuf>,

        #[clap(long, short)]
        /// Override the architecture of the packages
        arch: Option<String>,

        #[clap(long, short)]
        /// Keep other versions of the packages in the index
        preserve_versions: bool,

        #[clap(long)]
        /// Fail if a pool object with different content already exists
        fail_if_exists: bool,

        #[clap(long)]
        /// Only update the indices; the pool already has the files
        skip_package_upload: bool,

        #[clap(long = "ignore-iteration-in-dependencies")]
        /// Turn `=` dependencies into ranges that ignore the iteration
        ignore_iteration: bool,
    },

    /// List the packages in the repository
    List {
        #[clap(long, short)]
        /// Only list packages for this architecture
        arch: Option<String>,

        #[clap(long)]
        /// Print full package stanzas
        long: bool,
    },

    /// Show the stanza of a single package
    Show {
        package: String,
        version: String,
        arch: String,
    },

    /// Copy a package to another codename and component
    Copy {
        package: String,
        to_codename: String,
        to_component: String,

        #[clap(long, short, required = true)]
        /// Architecture of the package to copy
        arch: String,

        #[clap(long, num_args = 1..)]
        /// Only copy these versions
        versions: Option<Vec<String>>,

        #[clap(long, short)]
        /// Keep other versions of the package in the destination
        preserve_versions: bool,
    },

    /// Remove a package from the repository
    Delete {
        package: String,

        #[clap(long, short, required = true)]
        /// Architecture of the package to delete
        arch: String,

        #[clap(long, num_args = 1..)]
        /// Only delete these versions
        versions: Option<Vec<String>>,
    },

    /// Check that every indexed package exists in the pool
    Verify {
        #[clap(long, short)]
        /// Drop index entries whose package is missing
        fix_manifests: bool,
    },
}

fn progress(path: &str) {
    info!("Transferring {}", path);
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let file = match &cli.global.config {
        Some(path) => Some(
            ConfigFile::load(path)
                .with_context(|| format!("Unable to load configuration from {}", path.display()))?,
        ),
        None => None,
    };
    let settings = Settings::resolve(&cli.global, file)?;
    let storage = Storage::from_settings(&settings)?;
    let repository = Repository::new(storage, settings);

    match &cli.command {
        Command::Upload {
            files,
            arch,
            preserve_versions,
            fail_if_exists,
            skip_package_upload,
            ignore_iteration,
        } => {
            let options = UploadOptions {
                architecture: arch.clone(),
                preserve_versions: *preserve_versions,
                fail_if_exists: *fail_if_exists,
                skip_package_upload: *skip_package_upload,
                ignore_iteration: *ignore_iteration,
            };
            let uploaded = repository.upload(files, &options, &mut progress)?;
            info!("Update complete: {} packages", uploaded.len());
        }
        Command::List { arch, long } => {
            let packages = repository.list(arch.as_deref())?;
            if *long {
                for (i, package) in packages.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    print!("{}", package.to_paragraph());
                }
            } else {
                let rows: Vec<[String; 3]> = packages
                    .iter()
                    .map(|p| {
                        [
                            p.name.clone(),
                            p.full_version().unwrap_or_default(),
                            p.architecture.clone().unwrap_or_default(),
                        ]
                    })
                    .collect();
                let name_width = rows.iter().map(|r| r[0].len()).max().unwrap_or(0);
                let version_width = rows.iter().map(|r| r[1].len()).max().unwrap_or(0);
                for [name, version, arch] in rows {
                    println!(
                        "{:name_width$}  {:version_width$}  {}",
                        name, version, arch
                    );
                }
            }
        }
        Command::Show {
            package,
            version,
            arch,
        } => {
            let package = repository.show(package, version, arch)?;
            print!("{}", package.to_paragraph());
        }
        Command::Copy {
            package,
            to_codename,
            to_component,
            arch,
            versions,
            preserve_versions,
        } => {
            let copied = repository.copy(
                package,
                to_codename,
                to_component,
                arch,
                versions.as_deref(),
                *preserve_versions,
                &mut progress,
            )?;
            info!("Copied {} packages", copied.len());
        }
        Command::Delete {
            package,
            arch,
            versions,
        } => {
            let removed = repository.delete(package, arch, versions.as_deref(), &mut progress)?;
            info!("Deleted {} packages", removed.len());
        }
        Command::Verify { fix_manifests } => {
            let report = repository.verify(*fix_manifests, &mut progress)?;
            if report.is_clean() {
                info!("All packages are present");
            } else if report.fixed {
                info!("Removed {} missing packages from the indices", report.missing.len());
            } else {
                warn!(
                    "{} packages are missing; run with --fix-manifests to drop them",
                    report.missing.len()
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.logging.init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.logging.quiet {
                eprintln!("!! {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
