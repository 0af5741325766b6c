use astroget::config::toml_config::TomlConfig;
use astroget::config::Command;
use astroget::core::batch::read_targets;
use astroget::core::fits;
use astroget::domain::model::CutoutTarget;
use astroget::domain::query::{FindQuery, VoHduQuery};
use astroget::utils::error::ErrorSeverity;
use astroget::utils::{logger, validation::Validate};
use astroget::{ArchiveClient, AstrogetError, CliConfig, ClientOptions, LocalStorage};
use clap::Parser;
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CliConfig::parse();

    if let Some(path) = config.config.clone() {
        match TomlConfig::from_file(&path) {
            Ok(toml) => config.apply_toml(&toml),
            Err(e) => {
                eprintln!("❌ {}", e.user_friendly_message());
                std::process::exit(1);
            }
        }
    }

    // 初始化日誌
    logger::init_cli_logger(config.verbose);
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(
            "❌ astroget failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        // 依嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AstrogetError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(config: CliConfig) -> Result<(), AstrogetError> {
    // 本機檢查不需要連線
    if let Command::Check { path } = &config.command {
        let report = fits::check_file(path).await?;
        print_json(&report)?;
        if !report.is_valid() {
            return Err(AstrogetError::InvalidFits {
                message: format!("{} has {} problem(s)", path.display(), report.issues.len()),
            });
        }
        return Ok(());
    }

    let options = ClientOptions::from_config(&config).with_monitor(config.monitor);
    let storage = LocalStorage::new(config.output_path.clone());
    let client = ArchiveClient::connect(options, storage).await?;
    tracing::debug!("Connected: {}", client);

    match config.command {
        Command::Version => {
            println!("astroget {}", client.client_version());
            println!("api {} ({})", client.expected_server_version(), client.api_url());
        }
        Command::Find {
            outfields,
            constraints,
            limit,
            sort,
        } => {
            let mut query = FindQuery::new().outfields(outfields).limit(limit);
            query.constraints = constraints;
            if let Some(sort) = sort {
                query = query.sort(sort);
            }
            let found = client.find_with(&query, None).await?;
            tracing::info!("{}", found);
            print_json(&found)?;
        }
        Command::Vohdu {
            pos,
            size,
            instrument,
            obs_type,
            proc_type,
            format,
            verb,
            limit,
        } => {
            let mut query = VoHduQuery::new(pos, size).verb(verb);
            query.format = Some(format);
            query.instrument = instrument;
            query.obs_type = obs_type;
            query.proc_type = proc_type;
            query.limit = limit;
            let found = client.vohdu_with(&query, None).await?;
            tracing::info!("{}", found);
            print_json(&found)?;
        }
        Command::Retrieve {
            file_id,
            hdus,
            outfile,
        } => {
            let path = client.retrieve(&file_id, &hdus, outfile.as_deref()).await?;
            println!("📁 {}", path);
        }
        Command::Cutout {
            md5,
            hdu_idx,
            ra,
            dec,
            size,
            outfile,
        } => {
            let target = CutoutTarget::new(md5, hdu_idx, ra, dec);
            let path = client.cutout(&target, size, outfile.as_deref()).await?;
            println!("📁 {}", path);
        }
        Command::Cutouts {
            targets,
            size,
            archive,
        } => {
            let file = std::fs::File::open(&targets)?;
            let targets = read_targets(file)?;
            let summary = client.cutouts(size, &targets, &archive).await?;
            println!("✅ {}", summary);
        }
        Command::Header { md5, hdu } => {
            let headers = client.fetch_fits_header(&md5).await?;
            match hdu {
                Some(idx) => {
                    let header = headers.get(idx).ok_or_else(|| AstrogetError::ProcessingError {
                        message: format!("{} has {} HDUs, no HDU {}", md5, headers.len(), idx),
                    })?;
                    print_json(header)?;
                }
                None => print_json(&headers)?,
            }
        }
        Command::Bounds { md5, pos } => match pos {
            Some(pos) => match client.find_hdu(&md5, pos).await? {
                Some(bounds) => print_json(&bounds)?,
                None => println!("No HDU of {} contains {}", md5, pos),
            },
            None => print_json(&client.hdu_bounds(&md5).await?)?,
        },
        Command::Check { .. } => {}
    }

    Ok(())
}
