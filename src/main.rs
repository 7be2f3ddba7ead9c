// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use adflib::{
    format_protection_flags, load_adf_from_zip, DiskType, Entry, FormatOptions, Volume, ADF,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use std::error::Error;
use std::fs::{self, File};
use std::io::Write;

type CliResult<T> = Result<T, Box<dyn Error>>;

fn image_arg() -> Arg {
    Arg::new("FILE").required(true).help("The ADF file")
}

fn zip_entry_arg() -> Arg {
    Arg::new("zip-entry")
        .short('z')
        .long("zip-entry")
        .value_name("NAME")
        .help("Read the image from this entry of a ZIP archive")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of text")
}

fn path_arg(help: &'static str) -> Arg {
    Arg::new("PATH").required(true).help(help)
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> CliResult<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| format!("missing argument {}", id).into())
}

fn open_volume(matches: &ArgMatches) -> CliResult<Volume> {
    let file_path = required(matches, "FILE")?;
    let disk = match matches.get_one::<String>("zip-entry") {
        Some(entry) => load_adf_from_zip(&fs::read(file_path)?, entry)?,
        None => ADF::from_file(file_path)?,
    };
    Ok(Volume::open(disk)?)
}

/// Splits `dir/sub/name` into the containing directory and the last part.
fn split_path<'a>(volume: &Volume, path: &'a str) -> CliResult<(Entry, &'a str)> {
    let path = path.trim_end_matches('/');
    let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
    if name.is_empty() {
        return Err("path names the root directory".into());
    }
    Ok((volume.resolve(dir)?, name))
}

fn build_cli() -> Command {
    Command::new("adflibtool")
        .bin_name("adflibtool")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Volker Schwaberow <volker@schwaberow.de>")
        .about("Inspect and modify Amiga Disk Files")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("Creates a new zero-filled ADF file")
                .arg(image_arg()),
        )
        .subcommand(
            Command::new("format")
                .about("Formats an ADF file")
                .arg(image_arg())
                .arg(
                    Arg::new("TYPE")
                        .short('t')
                        .long("type")
                        .value_name("TYPE")
                        .help("Disk type (OFS, FFS)")
                        .default_value("OFS"),
                )
                .arg(
                    Arg::new("NAME")
                        .short('n')
                        .long("name")
                        .value_name("NAME")
                        .help("Disk name")
                        .default_value("Untitled"),
                )
                .arg(
                    Arg::new("intl")
                        .long("intl")
                        .action(ArgAction::SetTrue)
                        .help("Set the international flag"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Displays information about an ADF file")
                .arg(image_arg())
                .arg(zip_entry_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("Lists contents of a directory")
                .arg(image_arg())
                .arg(
                    Arg::new("directory")
                        .short('d')
                        .long("directory")
                        .value_name("DIR")
                        .help("Directory to list (default: root)"),
                )
                .arg(zip_entry_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("extract")
                .about("Extracts a file from an ADF")
                .arg(image_arg())
                .arg(path_arg("Path of the file within the ADF"))
                .arg(
                    Arg::new("OUTPUT")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output file (default: stdout)"),
                )
                .arg(zip_entry_arg()),
        )
        .subcommand(
            Command::new("add")
                .about("Copies a host file into an ADF")
                .arg(image_arg())
                .arg(Arg::new("SOURCE").required(true).help("The host file to copy"))
                .arg(path_arg("Destination path within the ADF")),
        )
        .subcommand(
            Command::new("mkdir")
                .about("Creates a directory")
                .arg(image_arg())
                .arg(path_arg("Path of the new directory")),
        )
        .subcommand(
            Command::new("rm")
                .about("Removes a file or a directory with everything below it")
                .arg(image_arg())
                .arg(path_arg("Path to remove")),
        )
        .subcommand(
            Command::new("rename")
                .about("Renames an entry within its directory")
                .arg(image_arg())
                .arg(path_arg("Path of the entry"))
                .arg(Arg::new("NEW_NAME").required(true).help("The new name")),
        )
        .subcommand(
            Command::new("mv")
                .about("Moves an entry into another directory")
                .arg(image_arg())
                .arg(path_arg("Path of the entry"))
                .arg(Arg::new("DEST").required(true).help("Destination directory")),
        )
        .subcommand(
            Command::new("check")
                .about("Verifies checksums, links and the allocation bitmap")
                .arg(image_arg())
                .arg(zip_entry_arg()),
        )
}

fn main() -> CliResult<()> {
    env_logger::init();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("create", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            ADF::blank().write_to_file(file_path)?;
            println!("Created empty ADF file: {}", file_path);
        }
        Some(("format", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let disk_type: DiskType = required(sub_matches, "TYPE")?.parse()?;
            let disk_name = required(sub_matches, "NAME")?;
            let options = FormatOptions {
                international: sub_matches.get_flag("intl"),
            };

            let volume = Volume::format(disk_type, disk_name, options)?;
            volume.write_to_file(file_path)?;
            println!(
                "Formatted ADF file: {} (Type: {}, Name: {})",
                file_path, disk_type, disk_name
            );
        }
        Some(("info", sub_matches)) => {
            let volume = open_volume(sub_matches)?;
            let info = volume.information();
            if sub_matches.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("ADF Information for {}:\n{}", required(sub_matches, "FILE")?, info);
                println!("Bitmap: {}", volume.bitmap_info());
            }
        }
        Some(("list", sub_matches)) => {
            let volume = open_volume(sub_matches)?;
            let path = sub_matches
                .get_one::<String>("directory")
                .map(String::as_str)
                .unwrap_or("");
            let files = volume.list_info(volume.resolve(path)?)?;

            if sub_matches.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                println!("Directory of {}:{}", volume.name(), path);
                println!("Name                            Size  Flags     Date");
                println!("----                            ----  -----     ----");
                for file in &files {
                    let size = if file.is_dir {
                        "(dir)".to_string()
                    } else {
                        file.size.to_string()
                    };
                    let date = file
                        .modified
                        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!(
                        "{:<30} {:>7}  {}  {}",
                        file.name,
                        size,
                        format_protection_flags(file.protection),
                        date
                    );
                    if !file.comment.is_empty() {
                        println!(": {}", file.comment);
                    }
                }
                println!("{} entries, {} blocks free", files.len(), volume.num_free_blocks());
            }
        }
        Some(("extract", sub_matches)) => {
            let volume = open_volume(sub_matches)?;
            let entry = volume.resolve(required(sub_matches, "PATH")?)?;

            match sub_matches.get_one::<String>("OUTPUT") {
                Some(path) => volume.write_file_to(entry, File::create(path)?)?,
                None => volume.write_file_to(entry, std::io::stdout().lock())?,
            }
        }
        Some(("add", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let mut volume = Volume::from_file(file_path)?;
            let contents = fs::read(required(sub_matches, "SOURCE")?)?;
            let (dir, name) = split_path(&volume, required(sub_matches, "PATH")?)?;
            volume.create_file(dir, name, &contents)?;
            volume.write_to_file(file_path)?;
            info!("Added '{}' ({} bytes)", name, contents.len());
        }
        Some(("mkdir", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let mut volume = Volume::from_file(file_path)?;
            let (dir, name) = split_path(&volume, required(sub_matches, "PATH")?)?;
            volume.create_directory(dir, name)?;
            volume.write_to_file(file_path)?;
        }
        Some(("rm", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let mut volume = Volume::from_file(file_path)?;
            let (dir, name) = split_path(&volume, required(sub_matches, "PATH")?)?;
            volume.remove_entry(dir, name)?;
            volume.write_to_file(file_path)?;
        }
        Some(("rename", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let mut volume = Volume::from_file(file_path)?;
            let (dir, name) = split_path(&volume, required(sub_matches, "PATH")?)?;
            volume.rename_entry(dir, name, required(sub_matches, "NEW_NAME")?)?;
            volume.write_to_file(file_path)?;
        }
        Some(("mv", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let mut volume = Volume::from_file(file_path)?;
            let entry = volume.resolve(required(sub_matches, "PATH")?)?;
            let dest = volume.resolve(required(sub_matches, "DEST")?)?;
            volume.move_entry(entry, dest)?;
            volume.write_to_file(file_path)?;
        }
        Some(("check", sub_matches)) => {
            let volume = open_volume(sub_matches)?;
            volume.check()?;
            println!(
                "{}: {} volume '{}' is consistent ({} blocks free)",
                required(sub_matches, "FILE")?,
                volume.filesystem_type(),
                volume.name(),
                volume.num_free_blocks()
            );
        }
        _ => unreachable!("Exhaustive subcommand matching should prevent this"),
    }

    Ok(())
}
