// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use serde::Serialize;

use crate::common::{Error, ErrorCode, ErrorKind, Result};

/// Recorded node values over a simulation run, one row per step (the
/// starting state included), column-oriented by node display name plus a
/// leading `time` column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Results {
    pub offsets: HashMap<String, usize>,
    // one large allocation
    pub data: Box<[f64]>,
    pub step_size: usize,
    pub step_count: usize,
}

impl Results {
    pub fn iter(&self) -> std::slice::Chunks<'_, f64> {
        self.data.chunks(self.step_size)
    }

    /// The recorded series for one column, by display name.
    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        let off = *self.offsets.get(name)?;
        Some(self.iter().map(|row| row[off]).collect())
    }

    /// Serializes the results for export collaborators.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| Error::new(ErrorKind::Simulation, ErrorCode::Generic, Some(err.to_string())))
    }

    pub fn print_tsv(&self) {
        let var_names = {
            let offset_name_map: HashMap<usize, &str> =
                self.offsets.iter().map(|(k, v)| (*v, k.as_str())).collect();
            let mut var_names: Vec<&str> = Vec::with_capacity(self.step_size);
            for i in 0..(self.step_size) {
                var_names.push(offset_name_map.get(&i).copied().unwrap_or("UNKNOWN"));
            }
            var_names
        };

        for (i, name) in var_names.iter().enumerate() {
            print!("{name}");
            if i == var_names.len() - 1 {
                println!();
            } else {
                print!("\t");
            }
        }

        for row in self.iter() {
            for (i, value) in row.iter().enumerate() {
                print!("{value}");
                if i == row.len() - 1 {
                    println!();
                } else {
                    print!("\t");
                }
            }
        }
    }
}
