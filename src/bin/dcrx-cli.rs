// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Headless dcrx runner
//!
//! Boots the core without a display back end. Useful for BIOS bring-up,
//! dcload console programs, and timing experiments.

use std::path::PathBuf;

use clap::Parser;

use dcrx::core::config::Config;
use dcrx::core::syscall::{bios, dcload};
use dcrx::core::system::Dreamcast;

#[derive(Parser, Debug)]
#[command(name = "dcrx-cli", version, about = "Sega Dreamcast emulation core (headless)")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "dcrx.toml")]
    config: PathBuf,

    /// Boot ROM image (overrides the config file)
    #[arg(short, long)]
    bios: Option<String>,

    /// Flash image
    #[arg(short, long)]
    flash: Option<String>,

    /// Install the BIOS-emulation and dcload syscall hooks instead of
    /// requiring a boot ROM
    #[arg(long)]
    hle: bool,

    /// Allow dcload guests to open local files and exit the process
    #[arg(long)]
    allow_unsafe: bool,

    /// Load this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state here on exit
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Run for this many virtual seconds then exit (0 = run until stopped)
    #[arg(short, long, default_value_t = 0)]
    run_seconds: u32,
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    };
    config.apply_env();
    if let Some(bios) = args.bios {
        config.bios_path = Some(bios);
    }
    if let Some(flash) = args.flash {
        config.flash_path = Some(flash);
    }
    if args.allow_unsafe {
        config.allow_unsafe = true;
    }

    let mut dc = Dreamcast::new();
    dc.set_timeslice(config.timeslice_ns);

    if let Some(path) = &config.bios_path {
        if let Err(err) = dc.load_bios(path) {
            log::error!("{err}");
            std::process::exit(1);
        }
    } else if !args.hle {
        log::warn!("No boot ROM configured; consider --hle for the syscall hooks");
    }
    if let Some(path) = &config.flash_path {
        dc.load_flash(path);
    }
    if args.hle {
        bios::install(&mut dc);
        dcload::install(&mut dc);
        dc.syscall.dcload.allow_unsafe = config.allow_unsafe;
    }

    if let Some(path) = &args.load_state {
        if let Err(err) = dc.load_state_file(path) {
            log::error!("{err}");
            std::process::exit(1);
        }
    }

    log::info!("Starting emulation");
    if args.run_seconds > 0 {
        dc.run_for(args.run_seconds, 0);
    } else {
        dc.run();
    }

    if let Some(path) = &args.save_state {
        if let Err(err) = dc.save_state_file(path) {
            log::error!("{err}");
            std::process::exit(1);
        }
    }
}
