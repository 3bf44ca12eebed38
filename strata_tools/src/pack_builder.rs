//! Pack a directory into a `.spk` resource archive
//!
//! ```text
//! pack_builder <SOURCE_DIR> <OUTPUT> [--block-size-kib <KIB>]
//! ```

use std::path::PathBuf;

use clap::{value_parser, Arg, Command};
use strata_engine::assets::archive::DEFAULT_BLOCK_SIZE;
use strata_engine::assets::{Archive, ArchiveBuilder};

fn cli() -> Command {
    Command::new("pack_builder")
        .about("Packs a directory of resources into a compressed archive")
        .arg(
            Arg::new("source")
                .value_name("SOURCE_DIR")
                .help("Directory whose files are packed, named by relative path")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("Archive file to write")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("block-size-kib")
                .short('b')
                .long("block-size-kib")
                .value_name("KIB")
                .help("Target size of each compressed block [default: 256]")
                .value_parser(value_parser!(usize)),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let matches = cli().get_matches();
    let source = matches.get_one::<PathBuf>("source").ok_or("missing source directory")?;
    let output = matches.get_one::<PathBuf>("output").ok_or("missing output path")?;
    let block_size = matches
        .get_one::<usize>("block-size-kib")
        .map_or(DEFAULT_BLOCK_SIZE, |kib| kib * 1024);

    let mut builder = ArchiveBuilder::new().with_block_size(block_size);
    let count = builder.add_directory(source)?;
    builder.write_file(output)?;

    // Read it back to catch anything the reader would reject
    let mut archive = Archive::open(output)?;
    for index in 0..archive.len() {
        archive.extract(index)?;
    }
    let stats = archive.decode_stats();
    log::info!(
        "Packed {} files into {} blocks ({} bytes uncompressed)",
        count,
        archive.block_count(),
        stats.bytes_inflated
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_block_size_is_optional_and_parsed() {
        let matches = cli().try_get_matches_from(["pack_builder", "assets", "out.spk"]).unwrap();
        assert_eq!(matches.get_one::<usize>("block-size-kib"), None);

        let matches = cli()
            .try_get_matches_from(["pack_builder", "assets", "out.spk", "--block-size-kib", "64"])
            .unwrap();
        assert_eq!(matches.get_one::<PathBuf>("output"), Some(&PathBuf::from("out.spk")));
        assert_eq!(matches.get_one::<usize>("block-size-kib"), Some(&64));
    }

    #[test]
    fn test_missing_output_is_rejected() {
        assert!(cli().try_get_matches_from(["pack_builder", "assets"]).is_err());
        assert!(cli()
            .try_get_matches_from(["pack_builder", "a", "b", "--block-size-kib", "big"])
            .is_err());
    }
}
