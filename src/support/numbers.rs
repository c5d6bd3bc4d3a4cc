pub fn num_word(n: usize) -> String {
    match (n % 10, n % 100) {
        (_, 11..=13) => format!("{}th", n),
        (1, _) => format!("{}st", n),
        (2, _) => format!("{}nd", n),
        (3, _) => format!("{}rd", n),
        _ => format!("{}th", n),
    }
}

/// Vote share as shown to users, rounded to a whole percent.
pub fn percent(value: f64) -> String {
    format!("{}%", value.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals() {
        assert_eq!(num_word(1), "1st");
        assert_eq!(num_word(2), "2nd");
        assert_eq!(num_word(3), "3rd");
        assert_eq!(num_word(4), "4th");
        assert_eq!(num_word(11), "11th");
        assert_eq!(num_word(12), "12th");
        assert_eq!(num_word(22), "22nd");
    }

    #[test]
    fn percents_round() {
        assert_eq!(percent(66.6), "67%");
        assert_eq!(percent(0.0), "0%");
    }
}
