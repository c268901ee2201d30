//! lza – CLI compression tool for the lza codec.
//!
//! Works similar to gzip / zstd:
//!   lza file.bin          → compress to file.bin.lza (removes original)
//!   lza -d file.bin.lza   → decompress to file.bin (removes original)
//!   lza -c file.bin       → compress to stdout
//!   lza -k file.bin       → keep original after compress
//!   lza -l file.bin.lza   → list info about compressed file
//!   cat file | lza -c     → compress stdin to stdout
//!   cat file | lza -dc    → decompress stdin to stdout
//!
//! The codec's container carries no sizes of its own, so files are framed
//! with a small header recording the original and decoded-payload lengths.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};

use lza::pipeline::{self, CompressedBlock, MAX_WINDOW_SIZE};

/// File frame magic.
const MAGIC: [u8; 3] = [b'L', b'Z', b'A'];
/// Frame format version.
const VERSION: u8 = 1;
/// magic(3) + version(1) + orig_len(4) + lz_len(4)
const FRAME_HEADER_SIZE: usize = 12;

/// Default probability window; adapts quickly to local byte statistics.
const DEFAULT_WINDOW: u32 = 128;

fn usage() {
    eprintln!("lza - executable-grade lossless compression tool");
    eprintln!();
    eprintln!("Usage: lza [OPTIONS] [FILE]...");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --decompress   Decompress mode");
    eprintln!("  -c, --stdout       Write to stdout (don't remove original)");
    eprintln!("  -k, --keep         Keep original file");
    eprintln!("  -f, --force        Overwrite existing output files");
    eprintln!("  -l, --list         List info about compressed file");
    eprintln!("  -w, --window N     Probability window size, 1-2048 (default 128)");
    eprintln!("  -q, --quiet        Suppress warnings");
    eprintln!("  -v, --verbose      Verbose output (packet statistics)");
    eprintln!("  -h, --help         Show this help");
    eprintln!();
    eprintln!("If no FILE is given, reads from stdin and writes to stdout.");
    eprintln!("Compressed files use the .lza extension.");
}

#[derive(Debug)]
struct Opts {
    decompress: bool,
    to_stdout: bool,
    keep: bool,
    force: bool,
    list: bool,
    verbose: bool,
    quiet: bool,
    window: u32,
    files: Vec<String>,
}

fn parse_args() -> Opts {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut opts = Opts {
        decompress: false,
        to_stdout: false,
        keep: false,
        force: false,
        list: false,
        verbose: false,
        quiet: false,
        window: DEFAULT_WINDOW,
        files: Vec::new(),
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-d" | "--decompress" => opts.decompress = true,
            "-c" | "--stdout" | "--to-stdout" => opts.to_stdout = true,
            "-k" | "--keep" => opts.keep = true,
            "-f" | "--force" => opts.force = true,
            "-l" | "--list" => opts.list = true,
            "-v" | "--verbose" => opts.verbose = true,
            "-q" | "--quiet" => opts.quiet = true,
            "-h" | "--help" => {
                usage();
                process::exit(0);
            }
            "-w" | "--window" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("lza: missing argument for -w");
                    process::exit(1);
                }
                opts.window = match args[i].parse::<u32>() {
                    Ok(n) if n >= 1 && n <= MAX_WINDOW_SIZE => n,
                    _ => {
                        eprintln!("lza: invalid window size '{}' (must be 1-2048)", args[i]);
                        process::exit(1);
                    }
                };
            }
            // Handle combined short flags like -dc, -kv, etc.
            s if s.starts_with('-') && !s.starts_with("--") && s.len() > 2 => {
                for ch in s[1..].chars() {
                    match ch {
                        'd' => opts.decompress = true,
                        'c' => opts.to_stdout = true,
                        'k' => opts.keep = true,
                        'f' => opts.force = true,
                        'l' => opts.list = true,
                        'v' => opts.verbose = true,
                        'q' => opts.quiet = true,
                        _ => {
                            eprintln!("lza: unknown flag '-{ch}'");
                            process::exit(1);
                        }
                    }
                }
            }
            _ => {
                opts.files.push(arg.clone());
            }
        }
        i += 1;
    }

    opts
}

/// Wrap a compressed block in the file frame.
fn frame(block: &CompressedBlock, original_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + block.data.len());
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(original_len as u32).to_le_bytes());
    out.extend_from_slice(&(block.lz_size as u32).to_le_bytes());
    out.extend_from_slice(&block.data);
    out
}

/// Split a framed file into (original_len, lz_len, container).
fn unframe(data: &[u8]) -> Result<(usize, usize, &[u8]), String> {
    if data.len() < FRAME_HEADER_SIZE || data[..3] != MAGIC {
        return Err("not an lza file".to_string());
    }
    if data[3] != VERSION {
        return Err(format!("unsupported format version {}", data[3]));
    }
    let orig_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let lz_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    Ok((orig_len, lz_len, &data[FRAME_HEADER_SIZE..]))
}

fn print_stats(original_len: usize, block: &CompressedBlock) {
    let stats = &block.stats;
    eprintln!("Original    {} bytes", original_len);
    eprintln!("LZ payload  {} bytes", block.lz_size);
    eprintln!("Compressed  {} bytes", FRAME_HEADER_SIZE + block.data.len());
    eprintln!("LIT         {}", stats.literals);
    eprintln!("MATCH       {}", stats.matches);
    eprintln!("SHORTREP    {}", stats.shortreps);
    for (i, count) in stats.longreps.iter().enumerate() {
        eprintln!("LONGREP{i}    {count}");
    }
}

fn compress_data(data: &[u8], opts: &Opts) -> Result<Vec<u8>, String> {
    // The frame stores lengths as u32; cap well below that.
    if data.len() >= 1 << 31 {
        return Err("input larger than the 2 GiB frame limit".to_string());
    }

    let block = pipeline::compress(data, opts.window).map_err(|e| format!("{e}"))?;

    // Self-check: decompress and compare before any output is written.
    let decoded =
        pipeline::decompress(&block.data, block.lz_size, data.len()).map_err(|e| format!("{e}"))?;
    if decoded != data {
        return Err("self-check failed: decompressed output differs".to_string());
    }

    if opts.verbose {
        print_stats(data.len(), &block);
    }

    Ok(frame(&block, data.len()))
}

fn decompress_data(data: &[u8]) -> Result<Vec<u8>, String> {
    let (orig_len, lz_len, container) = unframe(data)?;
    pipeline::decompress(container, lz_len, orig_len).map_err(|e| format!("{e}"))
}

fn list_file(path: &str, data: &[u8]) -> Result<(), String> {
    let (orig_len, lz_len, container) = unframe(data)?;
    let window = if container.len() >= 2 {
        u16::from_le_bytes([container[0], container[1]]) as u32
    } else {
        0
    };
    let ratio = if orig_len > 0 {
        data.len() as f64 * 100.0 / orig_len as f64
    } else {
        0.0
    };
    println!(
        "{}: {} -> {} bytes ({:.1}%), lz payload {} bytes, window {}",
        path,
        orig_len,
        data.len(),
        ratio,
        lz_len,
        window
    );
    Ok(())
}

/// Determine the output filename for compression.
fn compress_output_path(input: &str) -> PathBuf {
    PathBuf::from(format!("{input}.lza"))
}

/// Determine the output filename for decompression.
fn decompress_output_path(input: &str) -> Option<PathBuf> {
    let path = Path::new(input);
    match path.extension().and_then(|e| e.to_str()) {
        Some("lza") => Some(path.with_extension("")),
        _ => None,
    }
}

fn write_output(path: &Path, data: &[u8], force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use -f to overwrite)",
            path.display()
        ));
    }
    fs::write(path, data).map_err(|e| format!("{}: {e}", path.display()))
}

fn process_file(opts: &Opts, file: &str) -> Result<(), String> {
    let data = fs::read(file).map_err(|e| format!("{file}: {e}"))?;

    if opts.list {
        return list_file(file, &data);
    }

    if opts.decompress {
        let output = decompress_data(&data).map_err(|e| format!("{file}: {e}"))?;

        if opts.to_stdout {
            io::stdout()
                .write_all(&output)
                .map_err(|e| format!("stdout: {e}"))?;
            return Ok(());
        }

        let out_path = match decompress_output_path(file) {
            Some(p) => p,
            None => {
                return Err(format!("{file}: unknown suffix, use -c to write to stdout"));
            }
        };
        write_output(&out_path, &output, opts.force)?;

        if opts.verbose {
            eprintln!("{file}: {} -> {} bytes", data.len(), output.len());
        }

        if !opts.keep {
            fs::remove_file(file).map_err(|e| format!("{file}: {e}"))?;
        }
    } else {
        if !opts.quiet && file.ends_with(".lza") {
            eprintln!("lza: warning: {file} already has the .lza suffix");
        }

        let output = compress_data(&data, opts).map_err(|e| format!("{file}: {e}"))?;

        if opts.to_stdout {
            io::stdout()
                .write_all(&output)
                .map_err(|e| format!("stdout: {e}"))?;
            return Ok(());
        }

        let out_path = compress_output_path(file);
        write_output(&out_path, &output, opts.force)?;

        if opts.verbose {
            eprintln!("{file}: {} -> {} bytes", data.len(), output.len());
        }

        if !opts.keep {
            fs::remove_file(file).map_err(|e| format!("{file}: {e}"))?;
        }
    }

    Ok(())
}

fn process_stdio(opts: &Opts) -> Result<(), String> {
    let mut data = Vec::new();
    io::stdin()
        .read_to_end(&mut data)
        .map_err(|e| format!("stdin: {e}"))?;

    let output = if opts.decompress {
        decompress_data(&data).map_err(|e| format!("stdin: {e}"))?
    } else {
        compress_data(&data, opts)?
    };

    io::stdout()
        .write_all(&output)
        .map_err(|e| format!("stdout: {e}"))
}

fn main() -> ExitCode {
    let opts = parse_args();

    if opts.files.is_empty() {
        return match process_stdio(&opts) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("lza: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut failed = false;
    for file in &opts.files {
        if let Err(e) = process_file(&opts, file) {
            eprintln!("lza: {e}");
            failed = true;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
