use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "lingocast", about = "Live translation player")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/lingocast.toml")]
    pub config: String,

    /// Live manifest (.m3u8) to start translating right away
    #[arg(short, long)]
    pub url: Option<String>,

    /// Target language code (overrides config)
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Do not launch a video viewer
    #[arg(long)]
    pub no_video: bool,

    /// Keep narration silent (no audio device)
    #[arg(long)]
    pub no_audio: bool,

    /// Print the supported languages and exit
    #[arg(long)]
    pub list_languages: bool,
}
