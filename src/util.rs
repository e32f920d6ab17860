// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::time::Duration;

/// Outputs the given duration in a minutes:seconds format.
pub fn duration_minutes_seconds(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

/// Renders a pattern row as text, `x` for on and `.` for off.
pub fn format_row(row: &[bool]) -> String {
    row.iter().map(|on| if *on { 'x' } else { '.' }).collect()
}

/// Parses a row written by [format_row]. `x` or `X` is on, `.` or `-` is off and spaces
/// are ignored. Returns `None` on any other character.
pub fn parse_row(text: &str) -> Option<Vec<bool>> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            'x' | 'X' => Some(true),
            '.' | '-' => Some(false),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::util::{duration_minutes_seconds, format_row, parse_row};

    #[test]
    fn test_duration_minutes_strings() {
        assert_eq!("0:00", duration_minutes_seconds(Duration::new(0, 0)));
        assert_eq!("0:05", duration_minutes_seconds(Duration::new(5, 0)));
        assert_eq!("1:00", duration_minutes_seconds(Duration::new(60, 0)));
        assert_eq!("2:05", duration_minutes_seconds(Duration::new(125, 0)));
    }

    #[test]
    fn test_rows() {
        assert_eq!("x..x", format_row(&[true, false, false, true]));
        assert_eq!(
            Some(vec![true, false, false, true, true]),
            parse_row("x.-X x")
        );
        assert_eq!(None, parse_row("x?x"));
        assert_eq!(Some(vec![]), parse_row(""));
    }
}
