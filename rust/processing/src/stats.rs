// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-tile build statistics.

use crate::progress::Progress;
use crate::scene::SceneNode;
use crate::tile::TileKey;
use rustc_hash::FxHashSet;
use std::fmt::Write;
use std::time::Duration;

pub struct Analyzer;

impl Analyzer {
    /// Summarize a finished tile and clear the collected statistics.
    ///
    /// Entries whose name starts with `#` are counts and printed as-is;
    /// everything else is a time in seconds, printed in milliseconds and
    /// as a share of `total_time`. The report is logged and returned.
    pub fn analyze(
        node: &SceneNode,
        progress: &Progress,
        num_features: usize,
        total_time: Duration,
        key: &TileKey,
    ) -> String {
        if progress.collect_stats() {
            progress.set_stat("# drawables", node.drawable_count() as f64);
            progress.set_stat("# instances", node.instance_count() as f64);
            progress.set_stat("# textures", unique_textures(node) as f64);
            let vertices: usize = node
                .geodes
                .iter()
                .flat_map(|b| &b.drawables)
                .map(|d| d.mesh.vertex_count())
                .sum();
            progress.set_stat("# vertices", vertices as f64);
        }

        let total = total_time.as_secs_f64();
        let avg_ms = if num_features > 0 {
            1000.0 * total / num_features as f64
        } else {
            0.0
        };

        let mut report = format!(
            "Key = {} : Features = {}, Time = {} ms, Avg = {:.3} ms\nStats:\n",
            key.str(),
            num_features,
            (1000.0 * total) as i64,
            avg_ms
        );
        for (name, value) in progress.take_stats() {
            if name.starts_with('#') {
                let _ = writeln!(report, "    {name:>15}{value:>10}");
            } else {
                let share = if total > 0.0 { 100.0 * value / total } else { 0.0 };
                let _ = writeln!(
                    report,
                    "    {name:>15}{:>6} ms{:>6}%",
                    (1000.0 * value) as i64,
                    share as i64
                );
            }
        }

        tracing::info!(
            tile = %key,
            features = num_features,
            total_ms = (1000.0 * total) as u64,
            "{report}"
        );
        report
    }
}

fn unique_textures(node: &SceneNode) -> usize {
    node.geodes
        .iter()
        .flat_map(|b| &b.drawables)
        .chain(node.instances.iter().flat_map(|i| &i.model.drawables))
        .filter_map(|d| d.texture.as_ref().map(|t| t.uri.as_str()))
        .collect::<FxHashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyline_geometry::Matrix4;

    #[test]
    fn test_report_formats_and_clears() {
        let progress = Progress::with_stats();
        progress.set_stat("factory.create", 0.25);
        progress.set_stat("compile", 0.5);

        let node = SceneNode::new("tile", Matrix4::identity());
        let report = Analyzer::analyze(&node, &progress, 4, Duration::from_secs(1), &TileKey::new(3, 1, 2));

        assert!(report.starts_with("Key = 3/1/2 : Features = 4, Time = 1000 ms, Avg = 250.000 ms"));
        assert!(report.contains("factory.create   250 ms    25%"));
        assert!(report.contains("# drawables         0"));
        assert!(progress.stats().is_empty());
    }

    #[test]
    fn test_no_features() {
        let progress = Progress::new();
        let node = SceneNode::new("tile", Matrix4::identity());
        let report = Analyzer::analyze(&node, &progress, 0, Duration::ZERO, &TileKey::new(0, 0, 0));
        assert!(report.contains("Avg = 0.000 ms"));
        assert!(!report.contains("# drawables"));
    }
}
