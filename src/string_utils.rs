use std::fmt;
use std::ops::{Add, Div, Sub};

pub trait Int:
    Add<Output = Self> + Sub<Output = Self> + Div<Output = Self> + PartialOrd + PartialEq + Copy
{
    fn val(val: usize) -> Self;
}
impl Int for usize {
    fn val(val: usize) -> Self {
        val as Self
    }
}
impl Int for u32 {
    fn val(val: usize) -> Self {
        val as Self
    }
}
impl Int for u64 {
    fn val(val: usize) -> Self {
        val as Self
    }
}

pub fn size_to_str<T: Int + fmt::Display>(size: T) -> String {
    if size > T::val(1024 * 1024) {
        format!("{} MiB ({} bytes)", size / T::val(1024 * 1024), size)
    } else if size > T::val(1024) {
        format!("{} KiB ({} bytes)", size / T::val(1024), size)
    } else {
        format!("{} bytes", size)
    }
}

/// Parse a size string with an optional binary unit, eg "64KiB".
pub fn parse_size(size_str: &str) -> Result<usize, String> {
    let size_val: String = size_str.chars().filter(|a| a.is_numeric()).collect();
    let size_val: usize = size_val
        .parse()
        .map_err(|_| format!("invalid size '{}'", size_str))?;
    let size_unit: String = size_str.chars().filter(|a| !a.is_numeric()).collect();
    if size_unit.is_empty() {
        return Ok(size_val);
    }
    match size_unit.as_str() {
        "GiB" => Ok(1024 * 1024 * 1024 * size_val),
        "MiB" => Ok(1024 * 1024 * size_val),
        "KiB" => Ok(1024 * size_val),
        "B" => Ok(size_val),
        unit => Err(format!("invalid size unit '{}'", unit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sizes() {
        assert_eq!(parse_size("1000"), Ok(1000));
        assert_eq!(parse_size("64KiB"), Ok(64 * 1024));
        assert_eq!(parse_size("16MiB"), Ok(16 * 1024 * 1024));
        assert_eq!(parse_size("2GiB"), Ok(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("512B"), Ok(512));
        assert!(parse_size("64kb").is_err());
        assert!(parse_size("big").is_err());
    }
}
