//! chatspeak main entry point
//!
//! The main loop waits on two sources:
//! 1. stdin (console commands, one per line)
//! 2. a waker, poked whenever the chat reader or speech engine queues an event
//!
//! Timers (reconnect backoff, speech settle) bound the poll timeout.

use chatspeak::chat::{ChatEvent, ChatSource, TwitchChat};
use chatspeak::events::{self, Event};
use chatspeak::input::{parse_command, Command, LineReader};
use chatspeak::speech::{create_engine, SpeechEvent};
use chatspeak::state::config::Config;
use chatspeak::state::State;
use chatspeak::{ChatSpeakError, Result};
use log::{debug, error, info, warn};
use mio::{Events, Interest, Poll, Token, Waker};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Token for stdin in mio poll
const STDIN: Token = Token(0);
/// Token for the cross-thread waker
const WAKER: Token = Token(1);

/// Upper bound on one poll, so engines without callbacks get polled
const TICK: Duration = Duration::from_millis(100);

/// Global flag set by SIGINT/SIGTERM handler
static QUIT_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_quit_signal(_: libc::c_int) {
    QUIT_REQUESTED.store(true, Ordering::Relaxed);
}

/// Command line options
struct Options {
    debug: bool,
    channel: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> std::result::Result<Options, String> {
    let mut options = Options {
        debug: false,
        channel: None,
        config: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => options.debug = true,
            "--channel" | "-c" => {
                options.channel = Some(args.next().ok_or("--channel needs a value")?);
            }
            "--config" => {
                options.config = Some(PathBuf::from(
                    args.next().ok_or("--config needs a value")?,
                ));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: {} [--channel <name>] [--config <path>] [--debug]",
                    chatspeak::APP_NAME
                );
                process::exit(0);
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(options)
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    // Initialize logger
    if options.debug {
        // Debug mode: write to chatspeak.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("chatspeak.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open chatspeak.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "chatspeak version {} starting (debug mode, logging to chatspeak.log)",
            chatspeak::VERSION
        );
    } else {
        // Normal mode: warnings and errors to stderr, RUST_LOG still applies
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .parse_default_env()
            .init();
    }

    if let Err(e) = run(options) {
        error!("Fatal error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(options: Options) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(channel) = &options.channel {
        config.set_channel(channel);
    }

    let channel = config.channel();
    if channel.is_empty() {
        return Err(ChatSpeakError::Config(
            "No channel given. Use --channel <name> or set [chat] channel in the config file"
                .to_string(),
        ));
    }

    let mut poll = Poll::new()?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
    let (sender, rx) = events::channel(Some(waker));

    // Speech engine reports from its own callback threads
    let mut engine = create_engine(config.backend())?;
    let speech_sender = sender.clone();
    engine.set_listener(Some(Arc::new(move |event: SpeechEvent| {
        speech_sender.send(Event::Speech(event))
    })));

    // Chat reader thread reports the same way
    let mut chat = TwitchChat::new(config.twitch());
    chat.set_listener(Some(Arc::new(move |event: ChatEvent| {
        sender.send(Event::Chat(event))
    })));

    let mut state = State::new(config, Box::new(chat), engine);
    if let Some(path) = state.config.path() {
        info!("Configuration loaded from {:?}", path);
    }

    // Set up signal handlers for graceful exit
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe {
            signal::signal(sig, SigHandler::Handler(handle_quit_signal)).map_err(|e| {
                ChatSpeakError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to set {:?} handler: {}", sig, e),
                ))
            })?;
        }
    }

    let stdin_fd = io::stdin().as_raw_fd();
    set_nonblocking(stdin_fd)?;
    let mut stdin_source = mio::unix::SourceFd(&stdin_fd);
    let mut stdin_open = match poll
        .registry()
        .register(&mut stdin_source, STDIN, Interest::READABLE)
    {
        Ok(()) => true,
        Err(e) => {
            // Regular files cannot be polled; chat still works without commands
            warn!("Console commands unavailable: {}", e);
            false
        }
    };

    println!("chatspeak {} - joining #{}", chatspeak::VERSION, channel);
    println!("Type 'help' for commands, 'quit' to exit");

    state.start();
    let mut events = Events::with_capacity(16);
    let mut console = LineReader::new();
    let mut last_status = state.connection.status();

    loop {
        if QUIT_REQUESTED.load(Ordering::Relaxed) {
            info!("Quit signal received");
            break;
        }

        let timeout = state
            .time_until_next_scheduled(Instant::now())
            .map(|d| d.min(TICK))
            .or(Some(TICK));

        if let Err(e) = poll.poll(&mut events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                debug!("poll() interrupted by signal");
                continue;
            }
            return Err(e.into());
        }

        let mut quit = false;
        for event in events.iter() {
            match event.token() {
                STDIN => match console.drain(&mut io::stdin().lock()) {
                    Ok(input) => {
                        for line in input.lines {
                            if run_command(&mut state, &line) {
                                quit = true;
                            }
                        }
                        if input.closed && stdin_open {
                            info!("stdin closed, console commands disabled");
                            poll.registry().deregister(&mut stdin_source)?;
                            stdin_open = false;
                        }
                    }
                    Err(e) => {
                        error!("stdin error: {}", e);
                    }
                },
                WAKER => {}
                _ => {}
            }
        }
        if quit {
            return Ok(());
        }

        drain_events(&mut state, &rx);
        state.run_scheduled(Instant::now());
        state.tick();

        let status = state.connection.status();
        if status != last_status {
            println!("[{}]", status);
            last_status = status;
        }
    }

    if stdin_open {
        let _ = poll.registry().deregister(&mut stdin_source);
    }
    state.shutdown();
    Ok(())
}

/// Handle everything the worker threads queued since the last wakeup
fn drain_events(state: &mut State, rx: &Receiver<Event>) {
    while let Ok(event) = rx.try_recv() {
        if let Some(message) = state.handle_event(event) {
            println!("{}: {}", message.username, message.speakable_text);
        }
    }
}

/// Put stdin in non-blocking mode so it can be drained on each wakeup
fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

/// Execute one console line; returns true when the user asked to quit
fn run_command(state: &mut State, line: &str) -> bool {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return false,
        Err(e) => {
            println!("{}", e);
            return false;
        }
    };

    let quit = command == Command::Quit;
    match state.execute(command) {
        Ok(reply) => println!("{}", reply),
        Err(e) => println!("{}", e),
    }
    let _ = io::stdout().flush();
    quit
}
