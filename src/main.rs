use std::{error::Error, ops::ControlFlow, path::PathBuf, process};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use url::Url;

use tunescroll::{
    config::Config,
    controller::{Command, Controller},
    events::Event,
    query::{self, Preference},
    resource::ClockOutput,
    search::HttpSearch,
    track::TrackId,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

const HELP: &str = "\
commands:
  search <text>          search for tracks (empty text clears the search)
  genre <name> <query>   set the preferred genre
  more                   load the next page
  retry                  retry a page that failed to load
  list                   list the tracks loaded so far
  play <n>               play the track at position n
  pick <id>              play the track with identifier id
  toggle                 pause or resume
  seek <secs>            jump to a position in the current track
  next, prev             skip forward or back
  stop                   stop playback
  status                 show search and playback state
  quit                   exit";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "TUNESCROLL_CONFIG")]
    config: Option<PathBuf>,

    /// Search backend base URL
    ///
    /// Overrides the base URL of the configuration file.
    #[arg(short, long, value_hint = ValueHint::Url, env = "TUNESCROLL_URL")]
    url: Option<Url>,

    /// Initial search text
    #[arg(short, long)]
    search: Option<String>,

    /// Preferred genre as NAME=QUERY
    ///
    /// Searched for whenever the search text is empty.
    #[arg(short, long, value_name = "NAME=QUERY", value_parser = parse_preference)]
    genre: Option<Preference>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

fn parse_preference(arg: &str) -> Result<Preference, String> {
    match arg.split_once('=') {
        Some((name, query)) if !name.trim().is_empty() && !query.trim().is_empty() => {
            Ok(Preference::new(name.trim(), query.trim()))
        }
        _ => Err(format!("expected NAME=QUERY, got \"{arg}\"")),
    }
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive, and `verbose` is 0
            // by default. So this arm means: quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("tunescroll", level);
    }

    logger.init();
}

/// What the user asked for on one line of input.
#[derive(Clone, Debug, PartialEq)]
enum Input {
    Command(Command),
    Search(String),
    Genre(Preference),
    Retry,
    List,
    Status,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let input = match word {
        "search" => Input::Search(rest.to_owned()),
        "genre" => match rest.split_once(' ') {
            Some((name, query)) => Input::Genre(Preference::new(name, query.trim())),
            None => return Err("usage: genre <name> <query>".to_owned()),
        },
        "more" => Input::Command(Command::LoadMore),
        "retry" => Input::Retry,
        "list" => Input::List,
        "play" => {
            let index = rest
                .parse()
                .map_err(|_| format!("not a track number: \"{rest}\""))?;
            Input::Command(Command::PlayAt(index))
        }
        "pick" if !rest.is_empty() => Input::Command(Command::Select(TrackId::from(rest))),
        "toggle" => Input::Command(Command::TogglePlay),
        "seek" => {
            let seconds = rest
                .parse()
                .map_err(|_| format!("not a number of seconds: \"{rest}\""))?;
            Input::Command(Command::Seek(seconds))
        }
        "next" => Input::Command(Command::Next),
        "prev" => Input::Command(Command::Prev),
        "stop" => Input::Command(Command::Stop),
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => return Err(format!("unknown command: \"{line}\"; type `help`")),
    };

    Ok(input)
}

/// Session state owned by the front end.
#[derive(Clone, Debug, Default)]
struct Session {
    search: Option<String>,
    genre: Option<Preference>,
}

impl Session {
    fn effective_query(&self) -> Option<String> {
        query::effective(self.search.as_deref(), self.genre.as_ref())
    }
}

type App = Controller<HttpSearch, ClockOutput>;

fn execute(app: &mut App, session: &mut Session, input: Input) -> ControlFlow<()> {
    let commands = match input {
        Input::Command(command) => vec![command],
        Input::Search(text) => {
            session.search = Some(text);
            session
                .effective_query()
                .map(Command::SetQuery)
                .into_iter()
                .collect()
        }
        Input::Genre(preference) => {
            println!("genre: {preference}");
            session.genre = Some(preference);
            session
                .effective_query()
                .map(Command::SetQuery)
                .into_iter()
                .collect()
        }
        Input::Retry => vec![Command::ResetPagination, Command::LoadMore],
        Input::List => {
            for (index, track) in app.catalog().iter().enumerate() {
                println!("{index:>4}  {track}");
            }
            Vec::new()
        }
        Input::Status => {
            print_status(app);
            Vec::new()
        }
        Input::Help => {
            println!("{HELP}");
            Vec::new()
        }
        Input::Quit => return ControlFlow::Break(()),
    };

    for command in commands {
        if let Err(e) = app.handle(command) {
            warn!("{e}");
        }
    }

    ControlFlow::Continue(())
}

fn print_status(app: &App) {
    let fetcher = app.fetcher();
    let pages = fetcher.page_state();
    println!(
        "query: {} ({}); {} tracks; next page {}{}{}",
        fetcher.query().unwrap_or("<none>"),
        fetcher.generation(),
        app.catalog().len(),
        pages.page,
        if pages.loading { "; loading" } else { "" },
        if pages.has_more { "" } else { "; no more results" },
    );

    let playback = app.playback_state();
    match app.player().current_track(app.catalog()) {
        Some(track) => println!(
            "{:?}: {track} at {:.1}s of {:.1}s",
            playback.status(),
            playback.position.as_secs_f32(),
            playback.duration.as_secs_f32()
        ),
        None => println!("{:?}", playback.status()),
    }
}

fn print_event(app: &App, event: Event) {
    match event {
        Event::QueryChanged(generation) => println!(
            "searching for \"{}\" ({generation})",
            app.fetcher().query().unwrap_or_default()
        ),
        Event::PageLoaded {
            page,
            added,
            has_more,
            ..
        } => println!(
            "page {page}: {added} new tracks, {} total{}",
            app.catalog().len(),
            if has_more { "" } else { "; end of results" }
        ),
        Event::FetchFailed { page, .. } => {
            println!("page {page} failed to load; type `retry` to try again");
        }
        Event::TrackChanged(index) => {
            if let Some(track) = app.catalog().get(index) {
                println!("track {index}: {track}");
            }
        }
        Event::Play => println!("playing"),
        Event::Pause => println!("paused"),
        Event::Stopped => println!("stopped"),
        Event::Finished => println!("reached the last track"),
        Event::PlaybackFailed(index) => println!("track {index} failed to play"),
    }
}

/// Loads the configuration file, if any, and applies command line overrides.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };

    if let Some(url) = &args.url {
        config.base_url = url.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Main application loop.
///
/// Reads commands from standard input until it is closed, the user quits or
/// a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error when the configuration is invalid, the search backend
/// cannot be set up or standard input cannot be read.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    info!("searching {}", config.base_url);

    let search = HttpSearch::new(&config)?;
    let output = ClockOutput::new(config.preview_length());
    let mut app = Controller::new(&config, search, output);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    app.register(event_tx);

    let mut session = Session {
        search: args.search,
        genre: args.genre,
    };
    if let Some(query) = session.effective_query() {
        app.handle(Command::SetQuery(query))?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = &mut ctrl_c => {
                info!("shutting down gracefully");
                break;
            }

            Some(event) = event_rx.recv() => print_event(&app, event),

            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("end of input");
                    break;
                };

                if line.trim().is_empty() {
                    continue;
                }

                match parse_input(&line) {
                    Ok(input) => {
                        if execute(&mut app, &mut session, input).is_break() {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }

            result = app.poll_next() => {
                if let Err(e) = result {
                    warn!("{e}");
                }
            }
        }
    }

    app.handle(Command::Stop)?;
    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
