//! Template name conversions.
//!
//! Templates are addressed with `/` separators by users (`official/k6`) but
//! stored under a `--` separated name (`official--k6`), since `/` is not a valid
//! character for stored object names.

const DISPLAY_SEPARATOR: &str = "/";
const INTERNAL_SEPARATOR: &str = "--";

/// Convert a user-facing template name into its stored form.
///
/// e.g. `official/k6/v1` -> `official--k6--v1`
pub fn internal_template_name(name: &str) -> String {
  name.replace(DISPLAY_SEPARATOR, INTERNAL_SEPARATOR)
}

/// Convert a stored template name back into its user-facing form.
///
/// e.g. `official--k6--v1` -> `official/k6/v1`
pub fn display_template_name(name: &str) -> String {
  name.replace(INTERNAL_SEPARATOR, DISPLAY_SEPARATOR)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_internal_name() {
    assert_eq!(internal_template_name("official/k6/v1"), "official--k6--v1");
    assert_eq!(internal_template_name("plain"), "plain");
  }

  #[test]
  fn test_display_name() {
    assert_eq!(display_template_name("official--k6--v1"), "official/k6/v1");
  }

  #[test]
  fn test_names_are_inverse() {
    let name = "my-org/base";
    assert_eq!(display_template_name(&internal_template_name(name)), name);
  }
}
