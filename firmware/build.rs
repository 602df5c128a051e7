// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` from the shared flash layout so the application image
//! can never grow into the record log pages at the end of flash.

use consts::{BASE_APP_ADDR, STORAGE_BASE_ADDR};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());

    /* S132 7.x with one central link and the default event length */
    /* needs a little under 12K at the start of RAM. */
    let soft_device_ram_reserved = 0x3000;

    let memory_x_content = format!(
        r##"
        BASE_APP_ADDR = {:#X};
        STORAGE_BASE_ADDR = {:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            FLASH (rx) : ORIGIN = 0x00000000 + BASE_APP_ADDR, LENGTH = STORAGE_BASE_ADDR - BASE_APP_ADDR
            RAM : ORIGIN = 0x20000000 + {}, LENGTH = 64K - {}
        }}
        "##,
        BASE_APP_ADDR, STORAGE_BASE_ADDR, soft_device_ram_reserved, soft_device_ram_reserved
    );
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();

    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
