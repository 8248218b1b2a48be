//! Rendering of a finished run.

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;
use thiserror::Error;

use crate::{
	engine::RunSummary,
	k8s::Kind,
	storage::{DiffStorage, Severity, StorageError},
};

#[derive(Debug, Error)]
pub enum ReportError {
	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error("serializing report")]
	Json(#[source] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct BatchView<'a> {
	kind: Kind,
	namespace: &'a str,
	/// Empty for findings about the kind as a whole.
	name: &'a str,
	diffs: Vec<RecordView>,
}

#[derive(Debug, Serialize)]
struct RecordView {
	severity: Severity,
	message: String,
}

/// JSON array of batches in identity order; identical runs render
/// byte-identical output.
pub fn render_json(storage: &DiffStorage) -> Result<String, ReportError> {
	let batches = storage.batches()?;
	let views: Vec<BatchView<'_>> = batches
		.iter()
		.map(|batch| BatchView {
			kind: batch.identity().kind,
			namespace: &batch.identity().namespace,
			name: &batch.identity().name,
			diffs: batch
				.diffs()
				.into_iter()
				.map(|record| RecordView {
					severity: record.severity,
					message: record.message,
				})
				.collect(),
		})
		.collect();
	serde_json::to_string_pretty(&views).map_err(ReportError::Json)
}

/// Human readable report: findings grouped per object, then a summary.
pub fn render_text(
	storage: &DiffStorage,
	summary: &RunSummary,
	first: &str,
	second: &str,
) -> Result<String, ReportError> {
	let mut out = String::new();
	let _ = writeln!(
		out,
		"{}",
		format!("Comparing cluster 1 ({first}) with cluster 2 ({second})").bold()
	);

	let batches = storage.batches()?;
	if batches.is_empty() && summary.cancelled {
		let _ = writeln!(
			out,
			"\n{}",
			"No differences found before the run was cancelled".yellow()
		);
	} else if batches.is_empty() {
		let _ = writeln!(out, "\n{}", "✓ No differences found".green());
	}
	for batch in &batches {
		let _ = writeln!(out, "\n{}", batch.identity().to_string().cyan());
		for record in batch.diffs() {
			let marker = match record.severity {
				Severity::Critical => "✗".red(),
				Severity::Warning => "!".yellow(),
			};
			let _ = writeln!(out, "  {marker} {}", record.message);
		}
	}

	let totals = summary.totals();
	let _ = writeln!(out, "\n{}", "Summary:".bold());
	let _ = writeln!(out, "  Compared:           {}", totals.compared);
	let _ = writeln!(out, "  Differing:          {}", totals.differing);
	let _ = writeln!(out, "  Inconclusive:       {}", totals.inconclusive);
	let _ = writeln!(out, "  Only in cluster 1:  {}", totals.only_first);
	let _ = writeln!(out, "  Only in cluster 2:  {}", totals.only_second);
	if totals.cancelled > 0 {
		let _ = writeln!(out, "  Not compared:       {}", totals.cancelled);
	}

	if !summary.failures.is_empty() {
		let _ = writeln!(
			out,
			"  {}",
			format!("Failed kinds:       {}", summary.failures.len()).red()
		);
		for failure in &summary.failures {
			let _ = writeln!(
				out,
				"    {} in {}: {}",
				failure.kind, failure.namespace, failure.error
			);
		}
	}
	if summary.cancelled {
		let _ = writeln!(out, "  {}", "Run was cancelled, results are partial".yellow());
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;

	use super::*;
	use crate::{
		engine::{KindFailure, KindSummary},
		storage::ObjectIdentity,
	};

	fn storage() -> DiffStorage {
		let storage = DiffStorage::new();
		storage
			.record(
				ObjectIdentity::new(Kind::Service, "default", "web"),
				Severity::Critical,
				"port count differs: 2 vs 1",
			)
			.unwrap();
		storage
			.record(
				ObjectIdentity::kind_level(Kind::ConfigMap, "default"),
				Severity::Warning,
				"ConfigMap count differs: 3 vs 2",
			)
			.unwrap();
		storage.finalize();
		storage
	}

	#[test]
	fn test_render_requires_finalized_storage() {
		let storage = DiffStorage::new();
		assert_matches!(
			render_json(&storage),
			Err(ReportError::Storage(StorageError::NotFinalized))
		);
	}

	#[test]
	fn test_render_json() {
		let expected = indoc! {r#"
			[
			  {
			    "kind": "service",
			    "namespace": "default",
			    "name": "web",
			    "diffs": [
			      {
			        "severity": "critical",
			        "message": "port count differs: 2 vs 1"
			      }
			    ]
			  },
			  {
			    "kind": "configMap",
			    "namespace": "default",
			    "name": "",
			    "diffs": [
			      {
			        "severity": "warning",
			        "message": "ConfigMap count differs: 3 vs 2"
			      }
			    ]
			  }
			]"#};
		assert_eq!(render_json(&storage()).unwrap(), expected);
	}

	#[test]
	fn test_render_text() {
		colored::control::set_override(false);
		let summary = RunSummary {
			kinds: vec![KindSummary {
				kind: Some(Kind::Service),
				namespace: "default".to_string(),
				compared: 4,
				differing: 1,
				..KindSummary::default()
			}],
			failures: vec![KindFailure {
				kind: Kind::Secret,
				namespace: "default".to_string(),
				error: "forbidden".to_string(),
			}],
			cancelled: false,
		};
		let text = render_text(&storage(), &summary, "prod-a", "prod-b").unwrap();

		assert!(text.starts_with("Comparing cluster 1 (prod-a) with cluster 2 (prod-b)\n"));
		assert!(text.contains("\nService default/web\n  ✗ port count differs: 2 vs 1\n"));
		assert!(text.contains("\nConfigMaps in default\n  ! ConfigMap count differs: 3 vs 2\n"));
		assert!(text.contains("  Compared:           4\n"));
		assert!(text.contains("    Secret in default: forbidden\n"));
		assert!(!text.contains("Not compared"));
	}

	#[test]
	fn test_render_text_of_cancelled_run() {
		colored::control::set_override(false);
		let storage = DiffStorage::new();
		storage.finalize();
		let summary = RunSummary {
			kinds: vec![KindSummary {
				kind: Some(Kind::Deployment),
				namespace: "default".to_string(),
				cancelled: 3,
				..KindSummary::default()
			}],
			cancelled: true,
			..RunSummary::default()
		};
		let text = render_text(&storage, &summary, "prod-a", "prod-b").unwrap();

		assert!(!text.contains("✓ No differences found"));
		assert!(text.contains("\nNo differences found before the run was cancelled\n"));
		assert!(text.contains("  Not compared:       3\n"));
		assert!(text.contains("  Run was cancelled, results are partial\n"));
	}
}
