use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Comandos que entiende el bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Play,
    Pause,
    Resume,
    Skip,
    Stop,
    Leave,
    Queue,
    NowPlaying,
    Shuffle,
    Clear,
    Help,
    Stats,
}

/// Nombre canónico, descripción y alias de cada comando
const COMMANDS: &[(Command, &str, &str, &[&str])] = &[
    (Command::Play, "play", "Reproduce una canción o la agrega a la cola", &["p"]),
    (Command::Pause, "pause", "Pausa la reproducción actual", &[]),
    (Command::Resume, "resume", "Reanuda la reproducción pausada", &["r"]),
    (Command::Skip, "skip", "Salta a la siguiente canción", &["s", "next"]),
    (Command::Stop, "stop", "Detiene la reproducción y limpia la cola", &[]),
    (Command::Leave, "leave", "Desconecta el bot del canal de voz", &["dc", "disconnect"]),
    (Command::Queue, "queue", "Muestra la cola de reproducción", &["q"]),
    (Command::NowPlaying, "nowplaying", "Muestra la canción actual", &["np"]),
    (Command::Shuffle, "shuffle", "Mezcla las canciones en cola", &[]),
    (Command::Clear, "clear", "Limpia la cola sin detener la canción actual", &[]),
    (Command::Help, "help", "Muestra información de ayuda", &["h"]),
    (Command::Stats, "stats", "Muestra el estado de la caché de audio", &[]),
];

impl Command {
    /// Busca un comando por nombre o alias (sin distinguir mayúsculas)
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().trim_start_matches(['/', '!']).to_lowercase();
        COMMANDS
            .iter()
            .find(|(_, canonical, _, aliases)| *canonical == name || aliases.contains(&name.as_str()))
            .map(|(command, ..)| *command)
    }

    pub fn name(self) -> &'static str {
        self.entry().1
    }

    pub fn description(self) -> &'static str {
        self.entry().2
    }

    pub fn aliases(self) -> &'static [&'static str] {
        self.entry().3
    }

    pub fn all() -> impl Iterator<Item = Command> {
        COMMANDS.iter().map(|(command, ..)| *command)
    }

    // La tabla sigue el orden de declaración del enum
    fn entry(self) -> &'static (Command, &'static str, &'static str, &'static [&'static str]) {
        &COMMANDS[self as usize]
    }

    fn build(self, name: &str, description: &str) -> CreateCommand {
        let command = CreateCommand::new(name).description(description);
        match self {
            Command::Play => command.add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "query",
                    "URL o término de búsqueda",
                )
                .required(true),
            ),
            Command::Queue => command.add_option(
                CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                    .min_int_value(1),
            ),
            Command::Help => command.add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "command",
                "Comando específico",
            )),
            _ => command,
        }
    }
}

/// Definiciones slash de todos los comandos, alias incluidos
pub fn create_commands() -> Vec<CreateCommand> {
    Command::all()
        .flat_map(|command| {
            let canonical = command.build(command.name(), command.description());
            let aliases = command.aliases().iter().map(move |alias| {
                command.build(alias, &format!("Alias de /{}", command.name()))
            });
            std::iter::once(canonical).chain(aliases)
        })
        .collect()
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in create_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, create_commands()).await?;

    Ok(())
}
