use std::fs::File;
use std::io::{Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{LevelFilter, error, info};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, WriteLogger};

use readagent::api::{BackendClient, ReadingBackend};
use readagent::chat::{ChatSession, Role, SendOutcome};
use readagent::client_state::ClientState;
use readagent::diagram::MermaidBackend;
use readagent::mindmap::outline_or_raw;
use readagent::panel::AppContext;
use readagent::viewer::{PageViewer, PaneGauge, Size, ViewerConfig};
use readagent::workspace::{Workspace, default_diagrams_dir};
use readagent::{event_source, panic_handler, settings, tui};

#[derive(Parser)]
#[command(name = "readagent", version)]
#[command(about = "Terminal client for the paper reading assistant")]
struct Cli {
    /// Backend address, overrides the settings file
    #[arg(long, global = true)]
    backend: Option<String>,

    /// User identifier, overrides the stored one
    #[arg(long, global = true)]
    user: Option<String>,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive reader (default)
    Tui,
    /// List the backend's local papers
    Papers,
    /// List your reading sessions
    Sessions,
    /// Open a local paper and print the reading guide
    Open { filename: String },
    /// Ask a question in a session, streaming the reply
    Chat {
        #[arg(short, long)]
        session: String,
        /// Read from stdin when omitted
        message: Option<String>,
    },
    /// Delete a session
    Delete { session: String },
    /// Print the mind map of a session
    Mindmap {
        #[arg(short, long)]
        session: String,
    },
    /// Render one page of a local PDF fit to a box
    Render {
        pdf: PathBuf,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "800")]
        width: f32,
        #[arg(long, default_value = "1000")]
        height: f32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_logging(debug: bool) -> Result<()> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        settings::get_log_level()
    };
    let dir = dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(settings::APP_NAME);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    WriteLogger::init(level, Config::default(), File::create(dir.join("readagent.log"))?)?;
    Ok(())
}

struct Services {
    backend: Arc<BackendClient>,
    client_state: ClientState,
}

impl Services {
    fn new(cli: &Cli) -> Result<Self> {
        if let Some(url) = &cli.backend {
            settings::set_backend_url(url);
        }
        let backend = Arc::new(BackendClient::from_settings()?);
        let mut client_state = ClientState::load_or_ephemeral(ClientState::default_path().as_deref());
        if let Some(user) = &cli.user {
            client_state.set_user_id(user);
        }
        info!(
            "Backend {} as {}",
            backend.base_url(),
            client_state.user_id()
        );
        Ok(Self {
            backend,
            client_state,
        })
    }

    fn workspace(&self, gauge: Arc<PaneGauge>) -> Workspace {
        let user_id = self.client_state.user_id();
        let backend: Arc<dyn ReadingBackend> = self.backend.clone();
        let viewer = PageViewer::spawn(gauge, ViewerConfig::from_settings());
        Workspace::new(
            backend,
            Arc::new(ChatSession::new(user_id)),
            Arc::new(AppContext::new(user_id)),
            viewer,
        )
        .with_diagram_backend(Box::new(
            MermaidBackend::new().with_output_dir(default_diagrams_dir()),
        ))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    settings::load_settings();
    init_logging(cli.debug)?;
    info!("Starting readagent");

    let result = match cli.command {
        None | Some(Commands::Tui) => run_tui(&cli).await,
        Some(_) => {
            human_panic::setup_panic!();
            run_command(&cli).await
        }
    };
    if let Err(e) = &result {
        error!("{e:#}");
    }
    info!("Shutting down readagent");
    result
}

async fn run_tui(cli: &Cli) -> Result<()> {
    let services = Services::new(cli)?;
    let gauge = Arc::new(PaneGauge::default());
    let workspace = Arc::new(services.workspace(gauge.clone()));
    let mut app = tui::App::new(workspace, gauge, services.client_state);

    panic_handler::initialize_panic_handler();
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let res = tui::run(&mut terminal, &mut app, event_source::keyboard()).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_command(cli: &Cli) -> Result<()> {
    if let Some(Commands::Render {
        pdf,
        page,
        width,
        height,
        out,
    }) = &cli.command
    {
        return render_page(pdf, *page, Size::new(*width, *height), out.as_deref()).await;
    }

    let services = Services::new(cli)?;
    let backend = &services.backend;
    match &cli.command {
        Some(Commands::Papers) => {
            for paper in backend.local_papers().await? {
                let text = if paper.has_markdown { "text" } else { "pdf only" };
                println!("{:<40} {:>10} bytes  {text}", paper.filename, paper.size);
            }
        }
        Some(Commands::Sessions) => {
            for session in backend.sessions(services.client_state.user_id()).await? {
                println!(
                    "{}  {}  {}",
                    session.session_id,
                    session.updated_at.as_deref().unwrap_or("-"),
                    session.display_title()
                );
            }
        }
        Some(Commands::Open { filename }) => {
            let gauge = Arc::new(PaneGauge::new(Size::new(800.0, 1000.0)));
            let workspace = services.workspace(gauge);
            workspace.open_local_paper(filename).await?;
            if let Some(session_id) = workspace.context().session_id() {
                println!("session {session_id}\n");
            }
            for message in workspace.chat().history() {
                println!("[{}] {}\n", message.role.label(), message.content);
            }
        }
        Some(Commands::Chat { session, message }) => {
            let message = match message {
                Some(message) => message.clone(),
                None => std::io::read_to_string(std::io::stdin())?,
            };
            chat_to_stdout(backend, services.client_state.user_id(), session, &message).await?;
        }
        Some(Commands::Delete { session }) => {
            backend.delete_session(session).await?;
            println!("Deleted {session}");
        }
        Some(Commands::Mindmap { session }) => {
            let outline = backend.generate_mindmap(session).await?;
            println!("{}", outline_or_raw(&outline.markdown));
        }
        None | Some(Commands::Tui) | Some(Commands::Render { .. }) => {}
    }
    Ok(())
}

/// Print whatever the assistant message gained since the last call
fn print_new(chat: &ChatSession, printed: usize) -> Result<usize> {
    let Some(last) = chat.last() else {
        return Ok(printed);
    };
    if last.role != Role::Assistant {
        return Ok(printed);
    }
    let mut out = stdout().lock();
    if last.is_error || last.content.len() < printed {
        writeln!(out, "\n{}", last.content)?;
    } else if let Some(fresh) = last.content.get(printed..) {
        write!(out, "{fresh}")?;
    }
    out.flush()?;
    Ok(last.content.len())
}

async fn chat_to_stdout(
    backend: &Arc<BackendClient>,
    user_id: &str,
    session_id: &str,
    message: &str,
) -> Result<()> {
    let chat = ChatSession::new(user_id);
    chat.set_session_id(Some(session_id.to_string()));
    chat.set_input_enabled(true);
    let mut notices = chat.subscribe();

    let send = chat.send_message(message, &**backend);
    tokio::pin!(send);
    let mut printed = 0;
    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome?,
            Some(_) = notices.recv() => printed = print_new(&chat, printed)?,
        }
    };
    print_new(&chat, printed)?;
    println!();
    match outcome {
        SendOutcome::Failed(message) => anyhow::bail!(message),
        SendOutcome::Ignored(reason) => anyhow::bail!("message not sent: {reason:?}"),
        SendOutcome::Completed => Ok(()),
    }
}

#[cfg(feature = "pdf")]
async fn render_page(
    pdf: &std::path::Path,
    page: usize,
    container: Size,
    out: Option<&std::path::Path>,
) -> Result<()> {
    use readagent::viewer::MupdfSource;

    let source = Arc::new(MupdfSource::open(pdf)?);
    let gauge = Arc::new(PaneGauge::new(container));
    let viewer = PageViewer::spawn(gauge, ViewerConfig::from_settings());
    viewer.open(source);
    viewer.go_to(page);

    let mut snapshots = viewer.subscribe();
    let snapshot = snapshots
        .wait_for(|s| {
            s.last_error.is_some()
                || (!s.rendering && s.surface.as_ref().is_some_and(|surface| surface.page == page))
        })
        .await
        .context("Page viewer stopped")?
        .clone();
    if let Some(error) = snapshot.last_error {
        anyhow::bail!(error);
    }
    let Some(surface) = snapshot.surface else {
        anyhow::bail!("nothing rendered");
    };

    println!(
        "page {} scale {:.3} css {:.0}x{:.0} backing {}x{}",
        surface.page,
        surface.scale,
        surface.css_size.width,
        surface.css_size.height,
        surface.backing_width,
        surface.backing_height
    );
    if let Some(out) = out {
        let raster = &surface.raster.raster;
        let image = image::RgbImage::from_raw(raster.width_px, raster.height_px, raster.pixels.clone())
            .context("Raster does not match its dimensions")?;
        image
            .save(out)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("wrote {}", out.display());
    } else {
        println!("{}", surface.text_layer.text());
    }
    Ok(())
}

#[cfg(not(feature = "pdf"))]
async fn render_page(
    _pdf: &std::path::Path,
    _page: usize,
    _container: Size,
    _out: Option<&std::path::Path>,
) -> Result<()> {
    anyhow::bail!("readagent was built without the pdf feature")
}
