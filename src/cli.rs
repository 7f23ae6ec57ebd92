use clap::Parser;
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::adjust::{DEFAULT_CONTRAST, DEFAULT_GAMMA};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "redway",
    version,
    about = "Wayland color temperature, controlled at runtime through a FIFO"
)]
pub struct Opts {
    /// Starting color temperature (K)
    pub temperature: Option<String>,

    /// Starting gamma modifier
    #[arg(short = 'g', long = "gamma", default_value_t = DEFAULT_GAMMA)]
    pub gamma: f64,

    /// Starting contrast offset (-80..80)
    #[arg(
        short = 'c',
        long = "contrast",
        default_value_t = DEFAULT_CONTRAST,
        allow_negative_numbers = true
    )]
    pub contrast: i32,

    /// Control FIFO path. Defaults to redway/io under the runtime state directory.
    #[arg(long = "fifo")]
    pub fifo: Option<PathBuf>,
}

impl Opts {
    /// Parses the command line. `Ok(None)` means an unrecognised leading
    /// dash argument (such as `-5`), which only prints usage like any other
    /// non-numeric temperature.
    pub fn try_parse_args<I, T>(args: I) -> Result<Option<Self>, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(opts) => Ok(Some(opts)),
            Err(err) if err.kind() == ErrorKind::UnknownArgument => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Starting temperature from the positional argument.
    ///
    /// `None` means the argument is not a number and only usage should be
    /// printed; the default is used when the argument is absent.
    pub fn start_temperature(&self, default: i32) -> Option<i64> {
        let Some(arg) = self.temperature.as_deref() else {
            return Some(i64::from(default));
        };
        let digits = arg.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        Some(arg[..digits].parse().unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opts {
        Opts::try_parse_from(std::iter::once("redway").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let opts = parse(&[]);
        assert_eq!(opts.start_temperature(5600), Some(5600));
        assert_eq!(opts.gamma, 1.0);
        assert_eq!(opts.contrast, 0);
        assert!(opts.fifo.is_none());
    }

    #[test]
    fn positional_temperature() {
        assert_eq!(parse(&["4500"]).start_temperature(5600), Some(4500));
        assert_eq!(parse(&["4500K"]).start_temperature(5600), Some(4500));
    }

    #[test]
    fn non_numeric_means_usage() {
        assert_eq!(parse(&["warm"]).start_temperature(5600), None);
    }

    #[test]
    fn unknown_dash_argument_means_usage() {
        for arg in ["-x", "-5"] {
            assert!(Opts::try_parse_args(["redway", arg]).unwrap().is_none(), "{arg}");
        }
    }

    #[test]
    fn malformed_option_value_is_an_error() {
        assert!(Opts::try_parse_args(["redway", "-g", "warm"]).is_err());
    }

    #[test]
    fn options() {
        let opts = parse(&["-g", "1.4", "-c", "-20", "--fifo", "/tmp/x", "3000"]);
        assert_eq!(opts.gamma, 1.4);
        assert_eq!(opts.contrast, -20);
        assert_eq!(opts.fifo, Some(PathBuf::from("/tmp/x")));
        assert_eq!(opts.start_temperature(5600), Some(3000));
    }
}
