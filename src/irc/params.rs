/// `p1 p2 :trailing param`
///
/// Everything after the first `:`-prefixed token is kept as-is,
/// including any spaces and colons.
pub(super) fn parse(src: &str, pos: &mut usize) -> Vec<String> {
  let mut params = Vec::new();
  loop {
    super::skip_spaces(src, pos);
    let rest = &src[*pos..];
    if rest.is_empty() {
      break;
    }

    if let Some(trailing) = rest.strip_prefix(':') {
      params.push(trailing.to_owned());
      *pos = src.len();
      break;
    }

    let end = rest.find(' ').unwrap_or(rest.len());
    params.push(rest[..end].to_owned());
    *pos += end;
  }
  params
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn params() {
    let data = "#channel  a :param_b :param_c";
    let params = parse(data, &mut 0);
    assert_eq!(params, vec!["#channel", "a", "param_b :param_c"]);
  }

  #[test]
  fn empty_trailing() {
    let params = parse("* :", &mut 0);
    assert_eq!(params, vec!["*", ""]);
  }

  #[test]
  fn nothing() {
    assert!(parse("", &mut 0).is_empty());
  }
}
