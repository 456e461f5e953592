use std::fmt::Debug;
use std::str::FromStr;

use arrayvec::ArrayVec;

use crate::defs::{Error, ErrorKind::*, Result};
use crate::vset;

pub struct Array<T: FromStr, const N: usize>(pub [T; N]);

impl<T: Debug + Default + FromStr, const N: usize> FromStr for Array<T, N> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed_err = || {
            let desc = format!("malformed value array '{}'", s);
            Error::new(MalformedData, desc)
        };

        let parse = |iter: &mut std::str::Split<char>| {
            let part = iter.next().ok_or_else(malformed_err)?;
            if part.is_empty() {
                Ok(T::default())
            } else {
                part.trim().parse::<T>().map_err(|_| malformed_err())
            }
        };

        let mut iter = s.split(',');
        let mut vec = ArrayVec::<T, N>::new();

        for _ in 0..N {
            vec.push(parse(&mut iter)?);
        }

        if iter.next().is_some() {
            return Err(malformed_err());
        }

        vec.into_inner().map(Array).map_err(|_| malformed_err())
    }
}

impl<T: FromStr, const N: usize> From<[T; N]> for Array<T, N> {
    fn from(array: [T; N]) -> Self {
        Self(array)
    }
}

#[macro_export]
macro_rules! define_raw_input {
    ($name: ident, $ext: expr) => {
        #[derive(structopt::StructOpt)]
        pub struct $name {
            #[structopt(
                help = concat!("Input .", $ext, " file (STDIN if omitted)"),
                name = "in-file"
            )]
            pub path: Option<std::path::PathBuf>,
        }

        impl $name {
            pub fn get(&self) -> $crate::defs::Result<Box<dyn std::io::Read>> {
                Ok(if let Some(path) = &self.path {
                    let file = $crate::util::fs::open_file(path)?;
                    Box::new(std::io::BufReader::new(file))
                        as Box<dyn std::io::Read>
                } else {
                    Box::new(std::io::stdin()) as Box<dyn std::io::Read>
                })
            }
        }
    };
}

#[macro_export]
macro_rules! define_raw_output {
    ($name: ident, $ext: expr) => {
        #[derive(structopt::StructOpt)]
        pub struct $name {
            #[structopt(
                help = concat!("Output .", $ext, " file (STDOUT if omitted)"),
                long = "out-file",
                short = "o"
            )]
            pub path: Option<std::path::PathBuf>,
        }

        impl $name {
            pub fn get(&self) -> $crate::defs::Result<Box<dyn std::io::Write>> {
                Ok(if let Some(path) = &self.path {
                    let file = $crate::util::fs::create_file(path)?;
                    Box::new(std::io::BufWriter::new(file))
                        as Box<dyn std::io::Write>
                } else {
                    Box::new(std::io::stdout()) as Box<dyn std::io::Write>
                })
            }
        }
    };
}

define_raw_input!(VsetInput, "vset");
define_raw_output!(TsvOutput, "tsv");

impl VsetInput {
    pub fn read(&self) -> Result<vset::ViewSet> {
        vset::read_view_set(self.get()?)
    }

    /// Directory the relative paths of the view set are resolved against.
    pub fn base_dir(&self) -> std::path::PathBuf {
        self.path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_from_str() {
        let array: Array<f64, 3> = "0.5,,-2".parse().unwrap();
        assert_eq!(array.0, [0.5, 0.0, -2.0]);

        assert!("1,2".parse::<Array<f64, 3>>().is_err());
        assert!("1,2,3,4".parse::<Array<f64, 3>>().is_err());
        assert!("1,a,3".parse::<Array<f64, 3>>().is_err());
    }

    #[test]
    fn test_vset_input_base_dir() {
        let input = VsetInput {
            path: Some("captures/cup/views.vset".into()),
        };
        assert_eq!(input.base_dir(), std::path::PathBuf::from("captures/cup"));

        let input = VsetInput { path: None };
        assert_eq!(input.base_dir(), std::path::PathBuf::new());
    }
}
