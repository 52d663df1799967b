//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let mut cut = max;
    while !s.is_char_boundary(cut) {
      cut -= 1;
    }
    format!("{}… ({} bytes total)", &s[..cut], s.len())
  }
}

/// True if a tutor reply quotes the official solution verbatim as a
/// contiguous substring. Monitoring only; the reply still stands.
pub fn reveals_solution(reply: &str, solution: &str) -> bool {
  let solution = solution.trim();
  !solution.is_empty() && reply.contains(solution)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_keys() {
    let out = fill_template("p={problem} a={attempt} p2={problem}", &[
      ("problem", "P"),
      ("attempt", "A"),
    ]);
    assert_eq!(out, "p=P a=A p2=P");
  }

  #[test]
  fn fill_template_leaves_unknown_keys() {
    assert_eq!(fill_template("x={missing}", &[]), "x={missing}");
  }

  #[test]
  fn trunc_keeps_short_strings() {
    assert_eq!(trunc_for_log("abc", 10), "abc");
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    let s = "ééééé";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('é'));
  }

  #[test]
  fn reveals_solution_detects_verbatim_quote() {
    assert!(reveals_solution("the answer is 2^10 = 1024 ways", "2^10 = 1024"));
    assert!(!reveals_solution("think about subsets", "2^10 = 1024"));
    assert!(!reveals_solution("anything", "   "));
  }
}
