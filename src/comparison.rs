use std::cmp::Ordering;

use crate::value::Value;

/// Ordering between two values, or `None` when they are not comparable.
///
/// Numbers compare numerically across int/float/bool, strings lexically,
/// lists element by element.
pub fn cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(sa), Value::Str(sb)) => Some(sa.cmp(sb)),
        (Value::List(la), Value::List(lb)) => {
            let la = la.read().clone();
            let lb = lb.read().clone();
            for (x, y) in la.iter().zip(lb.iter()) {
                match cmp_values(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(la.len().cmp(&lb.len()))
        }
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            Some(a.as_int()?.cmp(&b.as_int()?))
        }
        _ => {
            let (da, db) = (a.as_float()?, b.as_float()?);
            da.partial_cmp(&db)
        }
    }
}

/// Applies `pred_on_ord` to the ordering of `a` and `b`; incomparable values never match.
pub fn compare_with<F>(a: &Value, b: &Value, pred_on_ord: F) -> Option<bool>
where
    F: Fn(Ordering) -> bool,
{
    cmp_values(a, b).map(pred_on_ord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mixed_numbers() {
        assert_eq!(cmp_values(&Value::Int(2), &Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(cmp_values(&Value::Bool(true), &Value::Int(1)), Some(Ordering::Equal));
    }

    #[test]
    fn strings_and_lists() {
        assert_eq!(
            cmp_values(&Value::from("abc"), &Value::from("abd")),
            Some(Ordering::Less)
        );
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert_eq!(cmp_values(&a, &b), Some(Ordering::Greater));
    }

    #[test]
    fn incomparable() {
        assert_eq!(cmp_values(&Value::from("1"), &Value::Int(1)), None);
        assert_eq!(compare_with(&Value::None, &Value::None, |o| o.is_lt()), None);
    }
}
