use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        BoolishValueParser, ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn validator_ttl() -> ValueParser {
    ValueParser::from(move |ttl: &str| -> std::result::Result<i64, String> {
        match ttl.parse::<i64>() {
            Ok(seconds) if seconds > 0 => Ok(seconds),
            _ => Err("expected a positive number of seconds".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("rememberme")
        .about("Session and persistent remember-me authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("REMEMBERME_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("REMEMBERME_DSN")
                .required(true),
        )
        .arg(
            Arg::new("remember-me-ttl")
                .long("remember-me-ttl")
                .help("Seconds a remember-me grant may stay unused before it expires")
                .default_value("1209600")
                .env("REMEMBERME_TOKEN_TTL")
                .value_parser(validator_ttl()),
        )
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Session idle timeout in seconds")
                .default_value("1800")
                .env("REMEMBERME_SESSION_TTL")
                .value_parser(validator_ttl()),
        )
        .arg(
            Arg::new("cookie-insecure")
                .long("cookie-insecure")
                .help("Omit the Secure cookie attribute (local development over plain HTTP)")
                .env("REMEMBERME_COOKIE_INSECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("REMEMBERME_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
