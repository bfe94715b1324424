use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shufflebot::{
    audio::{
        coordinator::{CoordinatorSettings, ResolutionCoordinator},
        events::EventBus,
        registry::SessionRegistry,
        session::SessionSettings,
        voice::SongbirdTransport,
    },
    bot::ShuffleBot,
    cache::{AudioCache, TrackMetadataCache},
    config::Config,
    sources::ytdlp::YtDlpClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shufflebot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando ShuffleBot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let ytdlp = Arc::new(YtDlpClient::new(
        config.ytdlp_path.clone(),
        config.audio_format.clone(),
    ));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&ytdlp).await;
    }

    match ytdlp.verify_available().await {
        Ok(version) => info!("✅ yt-dlp {} disponible", version),
        Err(e) => warn!("⚠️ yt-dlp no disponible, las descargas fallarán: {:?}", e),
    }

    // Inicializar caché de audio
    let cache = Arc::new(AudioCache::open(
        &config.cache_dir,
        config.cache_capacity_bytes(),
        &config.audio_format,
    )?);
    let metadata = Arc::new(TrackMetadataCache::new(Duration::from_secs(
        config.metadata_ttl_secs,
    )));

    let coordinator = Arc::new(ResolutionCoordinator::new(
        cache,
        ytdlp.clone(),
        ytdlp,
        metadata.clone(),
        CoordinatorSettings::from(config.as_ref()),
    ));

    // Voz
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));

    let registry = SessionRegistry::new(
        coordinator,
        transport,
        EventBus::default(),
        SessionSettings::from(config.as_ref()),
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let shutdown = CancellationToken::new();
    let handler = ShuffleBot::new(
        config.clone(),
        registry.clone(),
        metadata,
        shutdown.clone(),
    );

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(ytdlp: &YtDlpClient) -> Result<()> {
    // Verificar dependencias críticas
    ytdlp.verify_available().await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
