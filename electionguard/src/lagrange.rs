use crate::*;

/// A present guardian with its Lagrange coefficient for this decryption
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LagrangeCoordinate {
    pub guardian_id: String,
    pub x_coordinate: u32,
    pub coefficient: ElementModQ,
}

/// w_ℓ = Π_{j≠ℓ} j / Π_{j≠ℓ} (j - ℓ) mod q, over the x coordinates of the present guardians
pub fn lagrange_coefficient(
    group: &GroupContext,
    x_coordinate: u32,
    present: &[u32],
) -> Result<ElementModQ, Error> {
    let fail = || Error::LagrangeCoefficient(x_coordinate, present.to_vec());

    if x_coordinate == 0 || !present.contains(&x_coordinate) {
        return Err(fail());
    }
    let mut seen = std::collections::HashSet::new();
    if present.iter().any(|x| *x == 0 || !seen.insert(*x)) {
        return Err(fail());
    }

    let mut numerator = group.one_q();
    let mut denominator = group.one_q();
    for j in present.iter().filter(|j| **j != x_coordinate) {
        let jq = group.q_from_u64(*j as u64);
        numerator = group.mult_q(&numerator, &jq);
        // j - ℓ may be negative
        let diff = group.sub_q(&jq, &group.q_from_u64(x_coordinate as u64));
        denominator = group.mult_q(&denominator, &diff);
    }
    group.div_q(&numerator, &denominator).ok_or_else(fail)
}

/// Coefficients for every present guardian, in x coordinate order
pub fn lagrange_coordinates(
    group: &GroupContext,
    present: &[(&str, u32)],
) -> Result<Vec<LagrangeCoordinate>, Error> {
    if present.is_empty() {
        return Err(Error::LagrangeCoefficient(0, vec![]));
    }
    let xs: Vec<u32> = present.iter().map(|(_, x)| *x).collect();
    let mut coordinates = present
        .iter()
        .map(|(id, x)| {
            Ok(LagrangeCoordinate {
                guardian_id: id.to_string(),
                x_coordinate: *x,
                coefficient: lagrange_coefficient(group, *x, &xs)?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    coordinates.sort_by_key(|c| c.x_coordinate);
    Ok(coordinates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_missing_value() {
        let group = GroupContext::tiny();
        // P(x) = 7 + 3x + 5x^2, present {2,3,4} recover P(1) = 15 through P(0)
        let p = |x: u64| group.q_from_u64(7 + 3 * x + 5 * x * x);
        let present = [2, 3, 4];

        let mut at_zero = group.zero_q();
        for x in &present {
            let w = lagrange_coefficient(&group, *x, &present).unwrap();
            at_zero = group.add_q(&at_zero, &group.mult_q(&w, &p(*x as u64)));
        }
        assert_eq!(at_zero, group.q_from_u64(7));

        // recovering P(1) directly: interpolate at 1 by shifting coordinates
        let shifted = [1, 2, 3];
        let mut at_one = group.zero_q();
        for x in &shifted {
            let w = lagrange_coefficient(&group, *x, &shifted).unwrap();
            at_one = group.add_q(&at_one, &group.mult_q(&w, &p(*x as u64 + 1)));
        }
        assert_eq!(at_one, p(1));
    }

    #[test]
    fn weights_sum_to_one() {
        let group = GroupContext::tiny();
        let coordinates = lagrange_coordinates(&group, &[("g3", 3), ("g1", 1)]).unwrap();
        assert_eq!(coordinates[0].guardian_id, "g1");
        let sum = group.add_q_all(coordinates.iter().map(|c| &c.coefficient));
        assert_eq!(sum, group.one_q());
    }

    #[test]
    fn degenerate_coordinates_fail() {
        let group = GroupContext::tiny();
        assert!(matches!(
            lagrange_coefficient(&group, 2, &[2, 2, 3]),
            Err(Error::LagrangeCoefficient(2, _))
        ));
        assert!(lagrange_coefficient(&group, 0, &[0, 1]).is_err());
        assert!(lagrange_coefficient(&group, 5, &[1, 2]).is_err());
        assert!(lagrange_coordinates(&group, &[]).is_err());
        assert_eq!(
            lagrange_coefficient(&group, 4, &[4]).unwrap(),
            group.one_q()
        );
    }
}
