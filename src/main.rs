mod settings;
mod store;

use crate::settings::Settings;
use crate::store::{AppStore, StoreUrl};
use anyhow::{anyhow, bail, Context, Result};
use app_parser::archive::{PackageArchive, ANDROID_MANIFEST};
use app_parser::axml::XmlDocument;
use app_parser::{AppInfo, Platform};
use clap::Parser;
use image::ImageFormat;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    /// Package to read, `.apk` or `.ipa`
    pub path: PathBuf,

    /// User specified config path
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Write the decoded icon as PNG
    #[arg(long)]
    pub icon_out: Option<PathBuf>,

    /// Look the bundle id up on the App Store (iOS only)
    #[arg(long)]
    pub lookup: bool,

    /// Storefront for the App Store link, overrides the config
    #[arg(long)]
    pub region: Option<String>,

    /// Screen density for Android icons, overrides the config
    #[arg(long)]
    pub density: Option<u16>,

    /// Print the decoded AndroidManifest.xml instead of the summary
    #[arg(long)]
    pub dump_manifest: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    #[serde(flatten)]
    app: &'a AppInfo,
    icon_width: Option<u32>,
    icon_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_url: Option<StoreUrl>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(r) = args.region {
        settings.region = r;
    }
    if let Some(d) = args.density {
        settings.density = d;
    }

    if args.dump_manifest {
        let path = args.path.clone();
        let xml = tokio::task::spawn_blocking(move || dump_manifest(&path)).await??;
        println!("{}", xml);
        return Ok(());
    }

    let path = args.path.clone();
    let density = settings.density;
    let app = tokio::task::spawn_blocking(move || app_parser::extract_with_density(&path, density))
        .await?
        .with_context(|| format!("Failed to read {}", args.path.display()))?;

    if let Some(out) = &args.icon_out {
        match app.icon() {
            Ok(icon) => {
                icon.save_with_format(out, ImageFormat::Png)?;
                info!("Icon written to {}", out.display());
            }
            Err(e) => warn!("{}", e),
        }
    }

    let store_url = if args.lookup {
        if app.platform == Platform::Ios {
            let store: Box<dyn AppStore> = (&settings).try_into()?;
            Some(store.store_url(&app.bundle_id).await.regional(&settings.region))
        } else {
            warn!("App Store lookup is only available for iOS packages");
            None
        }
    } else {
        None
    };

    let (icon_width, icon_height) = match &app.icon {
        Some(i) => (Some(i.width()), Some(i.height())),
        None => (None, None),
    };
    let out = Output {
        app: &app,
        icon_width,
        icon_height,
        store_url,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn dump_manifest(path: &Path) -> Result<String> {
    if Platform::from_path(path)? != Platform::Android {
        bail!("{} is not an Android package", path.display());
    }
    let mut archive = PackageArchive::new(BufReader::new(File::open(path)?))?;
    let data = archive
        .read_by_name(ANDROID_MANIFEST)?
        .ok_or(anyhow!("{} not found", ANDROID_MANIFEST))?;
    Ok(XmlDocument::parse(&data)?.to_xml()?)
}
