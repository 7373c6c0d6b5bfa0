use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use voxloop::config::LlmProvider;
use voxloop::llm::{OpenAiChat, SimilarityModel};
use voxloop::pipeline::{
    LanguageModel, NoSpeechToText, OUTPUT_SAMPLE_RATE, SpeechPipeline, SpeechToText, TextToSpeech,
};
use voxloop::session::Transport;
use voxloop::session::console::ConsoleTransport;
use voxloop::thermostat::{self, Thermostat};
use voxloop::voice::{EnergyVad, OpenAiTts, TextOnlySpeech, WhisperStt, pcm_to_wav, wav_to_segment};
use voxloop::{Config, FunctionRegistry, SessionController};

/// voxloop - Voice assistant session loop
#[derive(Parser)]
#[command(name = "voxloop", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk to the assistant from the terminal
    Chat {
        /// Language model to use (overrides config)
        #[arg(long, value_parser = ["local", "openai"])]
        provider: Option<String>,
    },
    /// Serve the temperature control API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Transcribe a 16-bit WAV file
    Transcribe {
        /// Input file
        file: PathBuf,
    },
    /// Synthesize speech to a WAV file
    Speak {
        /// Text to speak
        text: String,
        /// Output file
        #[arg(short, long, default_value = "speech.wav")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,voxloop=info",
        1 => "info,voxloop=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    match cli.command {
        Command::Chat { provider } => {
            if let Some(provider) = provider {
                config.llm.provider = provider.parse()?;
            }
            chat(config).await
        }
        Command::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            thermostat::api::serve(Arc::new(Thermostat::new()), port).await?;
            Ok(())
        }
        Command::Transcribe { file } => transcribe(&config, &file).await,
        Command::Speak { text, out } => speak(&config, &text, &out).await,
    }
}

fn language_model(config: &Config) -> anyhow::Result<Arc<dyn LanguageModel>> {
    Ok(match config.llm.provider {
        LlmProvider::Local => Arc::new(SimilarityModel::default()),
        LlmProvider::OpenAi => {
            let key = config.api_keys.require_openai("chat completions")?;
            let mut client = OpenAiChat::new(key, config.llm.model.clone())?
                .with_base_url(&config.api_keys.openai_base_url);
            if let Some(max_tokens) = config.llm.max_tokens {
                client = client.with_max_tokens(max_tokens);
            }
            Arc::new(client)
        }
    })
}

/// Console session: stdin lines in, printed replies out
async fn chat(config: Config) -> anyhow::Result<()> {
    let thermostat = Arc::new(Thermostat::new());
    let mut functions = FunctionRegistry::new();
    thermostat::register_functions(&mut functions, thermostat)?;

    let stt: Arc<dyn SpeechToText> = Arc::new(NoSpeechToText);
    let tts: Arc<dyn TextToSpeech> = Arc::new(TextOnlySpeech);
    let pipeline = SpeechPipeline::new(
        Arc::new(EnergyVad::new(config.vad_config())),
        stt,
        language_model(&config)?,
        tts,
    );

    tracing::info!(provider = %config.llm.provider, "starting console session");
    println!("Type a message, or 'exit' to quit.");

    let controller = SessionController::new(config.session, pipeline, Arc::new(functions));
    let room = ConsoleTransport.connect().await?;
    let handle = controller.start(room);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted");
        }
        () = wait_closed(&handle) => {}
    }

    let chat = handle.shutdown().await?;
    tracing::info!(turns = chat.len(), "conversation finished");
    Ok(())
}

async fn wait_closed(handle: &voxloop::SessionHandle) {
    let mut state = handle.subscribe();
    let _ = state.wait_for(|s| s.is_closed()).await;
}

async fn transcribe(config: &Config, file: &Path) -> anyhow::Result<()> {
    let key = config.api_keys.require_openai("transcription")?;
    let stt = WhisperStt::new(key, config.voice.stt_model.clone())?
        .with_base_url(&config.api_keys.openai_base_url);

    let bytes = tokio::fs::read(file).await?;
    let segment = wav_to_segment(&bytes)?;
    tracing::debug!(
        path = %file.display(),
        samples = segment.samples.len(),
        "transcribing file"
    );

    let text = stt.transcribe(&segment).await?;
    println!("{text}");
    Ok(())
}

async fn speak(config: &Config, text: &str, out: &Path) -> anyhow::Result<()> {
    let key = config.api_keys.require_openai("speech synthesis")?;
    let tts = OpenAiTts::new(
        key,
        config.voice.tts_model.clone(),
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
    )?
    .with_base_url(&config.api_keys.openai_base_url);

    let mut stream = tts.synthesize(text).await?;
    let mut samples = Vec::new();
    while let Some(chunk) = stream.next().await {
        samples.extend(chunk?.samples);
    }

    let wav = pcm_to_wav(&samples, OUTPUT_SAMPLE_RATE)?;
    tokio::fs::write(out, wav).await?;
    println!("Wrote {} samples to {}", samples.len(), out.display());
    Ok(())
}
