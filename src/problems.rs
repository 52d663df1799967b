//! Read-only problem dataset lookup.
//!
//! Rows come from the built-in seeds, optionally extended or overridden by
//! the `[[problems]]` bank of the TOML study config. The repository is
//! immutable after startup; tasks reference rows by index.

use std::collections::HashMap;

use tracing::info;

use crate::config::StudyConfig;
use crate::domain::ProblemCard;
use crate::seeds::seed_problems;

#[derive(Clone, Debug)]
pub struct ProblemRepository {
  rows: HashMap<usize, ProblemCard>,
}

impl ProblemRepository {
  /// Build from seeds plus the optional config bank. Config rows win on
  /// index collision so a study can replace built-in content.
  pub fn new(cfg: Option<&StudyConfig>) -> Self {
    let mut rows = seed_problems();
    let mut from_config = 0usize;
    if let Some(cfg) = cfg {
      for p in &cfg.problems {
        rows.insert(p.row, ProblemCard {
          problem_statement: p.problem_statement.clone(),
          problem_solution: p.problem_solution.clone(),
          new_problem: p.new_problem.clone(),
          new_solution: p.new_solution.clone(),
        });
        from_config += 1;
      }
    }
    info!(target: "study", total = rows.len(), from_config, "Problem inventory loaded");
    Self { rows }
  }

  /// Read-only lookup of a dataset row.
  pub fn get(&self, row: usize) -> Option<&ProblemCard> {
    self.rows.get(&row)
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn seeds_are_available_without_config() {
    let repo = ProblemRepository::new(None);
    assert!(repo.get(5).is_some());
    assert!(repo.get(35).is_some());
    assert!(repo.get(3).is_some());
    assert!(repo.get(999).is_none());
  }

  #[test]
  fn config_rows_override_seeds_by_index() {
    let cfg: StudyConfig = toml::from_str(
      r#"
      [[problems]]
      row = 5
      problem_statement = "replaced"
      problem_solution = "replaced solution"

      [[problems]]
      row = 100
      problem_statement = "brand new"
      problem_solution = "s"
      new_problem = "np"
      new_solution = "ns"
      "#,
    )
    .unwrap();
    let repo = ProblemRepository::new(Some(&cfg));
    assert_eq!(repo.get(5).unwrap().problem_statement, "replaced");
    assert_eq!(repo.get(100).unwrap().new_problem, "np");
  }
}
