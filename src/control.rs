//! Text commands accepted on the control FIFO and the signal pipe.
//!
//! One command per token, tokens separated by `\n` or `\0`:
//!
//! - `+` / `-`: step the temperature up or down
//! - `6500`: absolute temperature
//! - `t…`, `g…`, `c…`: temperature, gamma or contrast. After the prefix
//!   (and any letters or spaces, so `temp 4000` works) either a lone `+`/`-`
//!   for a relative step, or a number for an absolute value.
//!
//! Anything else is ignored.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    AbsoluteTemperature(i64),
    StepTemperature(Step),
    AbsoluteGamma(f64),
    StepGamma(Step),
    AbsoluteContrast(i64),
    StepContrast(Step),
    Noop,
}

#[derive(Clone, Copy)]
enum Field {
    Temperature,
    Gamma,
    Contrast,
}

/// Splits raw channel bytes into trimmed, non-empty command tokens.
pub fn tokens(input: &[u8]) -> impl Iterator<Item = &str> {
    input
        .split(|&b| b == b'\n' || b == 0)
        .filter_map(|raw| std::str::from_utf8(raw).ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn parse(token: &str) -> Command {
    let token = token.trim();
    let Some(first) = token.chars().next() else {
        return Command::Noop;
    };
    match first {
        '+' => Command::StepTemperature(Step::Up),
        '-' => Command::StepTemperature(Step::Down),
        '0'..='9' => leading_int(token).map_or(Command::Noop, Command::AbsoluteTemperature),
        't' | 'T' => parse_field(Field::Temperature, &token[1..]),
        'g' | 'G' => parse_field(Field::Gamma, &token[1..]),
        'c' | 'C' => parse_field(Field::Contrast, &token[1..]),
        _ => Command::Noop,
    }
}

fn parse_field(field: Field, rest: &str) -> Command {
    let value = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c.is_whitespace());
    let step = match value.trim_end() {
        "+" => Some(Step::Up),
        "-" => Some(Step::Down),
        _ => None,
    };

    match (field, step) {
        (Field::Temperature, Some(step)) => Command::StepTemperature(step),
        (Field::Gamma, Some(step)) => Command::StepGamma(step),
        (Field::Contrast, Some(step)) => Command::StepContrast(step),
        (Field::Temperature, None) => {
            leading_int(value).map_or(Command::Noop, Command::AbsoluteTemperature)
        }
        (Field::Gamma, None) => leading_float(value).map_or(Command::Noop, Command::AbsoluteGamma),
        (Field::Contrast, None) => {
            leading_int(value).map_or(Command::Noop, Command::AbsoluteContrast)
        }
    }
}

/// Byte length of `[+-]?digits`, and optionally `.digits` after it.
fn number_prefix(s: &str, fraction: bool) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    if fraction && bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > end + 1 {
            end = frac_end;
        }
    }
    Some(end)
}

/// Leading signed integer, saturating at the `i64` bounds.
fn leading_int(s: &str) -> Option<i64> {
    let end = number_prefix(s, false)?;
    let digits = &s[..end];
    Some(digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    }))
}

fn leading_float(s: &str) -> Option<f64> {
    let end = number_prefix(s, true)?;
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_number_is_absolute_temperature() {
        assert_eq!(parse("6500"), Command::AbsoluteTemperature(6500));
        assert_eq!(parse("4000K"), Command::AbsoluteTemperature(4000));
    }

    #[test]
    fn plus_and_minus_step_temperature() {
        assert_eq!(parse("+"), Command::StepTemperature(Step::Up));
        assert_eq!(parse("-"), Command::StepTemperature(Step::Down));
        assert_eq!(parse("t+"), Command::StepTemperature(Step::Up));
    }

    #[test]
    fn temperature_prefix_skips_words() {
        assert_eq!(parse("t3000"), Command::AbsoluteTemperature(3000));
        assert_eq!(parse("temp 3000"), Command::AbsoluteTemperature(3000));
        assert_eq!(parse("Temperature4500.7"), Command::AbsoluteTemperature(4500));
    }

    #[test]
    fn gamma_commands() {
        assert_eq!(parse("g2.0"), Command::AbsoluteGamma(2.0));
        assert_eq!(parse("gamma 0.8"), Command::AbsoluteGamma(0.8));
        assert_eq!(parse("G3"), Command::AbsoluteGamma(3.0));
        assert_eq!(parse("g+"), Command::StepGamma(Step::Up));
        assert_eq!(parse("g -"), Command::StepGamma(Step::Down));
    }

    #[test]
    fn contrast_commands() {
        assert_eq!(parse("c+"), Command::StepContrast(Step::Up));
        assert_eq!(parse("c-"), Command::StepContrast(Step::Down));
        assert_eq!(parse("c-20"), Command::AbsoluteContrast(-20));
        assert_eq!(parse("contrast 15"), Command::AbsoluteContrast(15));
    }

    #[test]
    fn garbage_is_noop() {
        assert_eq!(parse(""), Command::Noop);
        assert_eq!(parse("   "), Command::Noop);
        assert_eq!(parse("x100"), Command::Noop);
        assert_eq!(parse("g"), Command::Noop);
        assert_eq!(parse("t abc"), Command::Noop);
    }

    #[test]
    fn huge_numbers_saturate() {
        assert_eq!(parse("99999999999999999999999"), Command::AbsoluteTemperature(i64::MAX));
        assert_eq!(parse("c-99999999999999999999999"), Command::AbsoluteContrast(i64::MIN));
    }

    #[test]
    fn tokens_split_on_newline_and_nul() {
        let input = b"+\0-\0\n6500\r\n\n  g1.2  \0trailing";
        let got: Vec<&str> = tokens(input).collect();
        assert_eq!(got, ["+", "-", "6500", "g1.2", "trailing"]);
    }
}
