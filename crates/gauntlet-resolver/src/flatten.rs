use gauntlet_config::Step;

/// Replace every step that only wraps its children with those children.
///
/// Nested wrappers collapse too, so flattening twice gives the same list.
pub fn flatten_steps(steps: Vec<Step>) -> Vec<Step> {
  if !steps.iter().any(Step::is_wrapper) {
    return steps;
  }

  let mut result = Vec::with_capacity(steps.len());
  for step in steps {
    if step.is_wrapper() {
      result.extend(flatten_steps(step.setup));
      result.extend(flatten_steps(step.steps));
    } else {
      result.push(step);
    }
  }
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn shell(command: &str) -> Step {
    let mut step = Step::default();
    step.base.operations.shell = Some(command.to_string());
    step
  }

  fn commands(steps: &[Step]) -> Vec<&str> {
    steps
      .iter()
      .map(|step| step.base.operations.shell.as_deref().unwrap_or_default())
      .collect()
  }

  #[test]
  fn test_flatten_wrapper() {
    let mut wrapper = Step::default();
    wrapper.setup.push(shell("a"));
    wrapper.steps.push(shell("b"));

    let flat = flatten_steps(vec![wrapper, shell("c")]);
    assert_eq!(commands(&flat), vec!["a", "b", "c"]);
  }

  #[test]
  fn test_flatten_nested_wrappers_is_idempotent() {
    let mut inner = Step::default();
    inner.steps.push(shell("a"));
    let mut outer = Step::default();
    outer.steps.push(inner);
    outer.steps.push(shell("b"));

    let once = flatten_steps(vec![outer]);
    assert_eq!(commands(&once), vec!["a", "b"]);
    assert_eq!(flatten_steps(once.clone()), once);
  }

  #[test]
  fn test_named_step_is_kept() {
    let mut named = Step::named("group");
    named.steps.push(shell("a"));
    let steps = vec![named];

    assert_eq!(flatten_steps(steps.clone()), steps);
  }
}
