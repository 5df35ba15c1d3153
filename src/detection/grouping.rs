use crate::detection::segmentation::LineRoi;

/// ROIs from different column hypotheses believed to show the same text line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineGroup {
    pub index: usize,
    pub reference_y: u32,
    pub members: Vec<LineRoi>,
}

/// Cluster ROIs by vertical centre. A ROI joins the current group while its
/// centre lies less than `tolerance` pixels from the group's first member.
pub fn group_lines(rois: &[LineRoi], tolerance: u32) -> Vec<LineGroup> {
    let mut sorted = rois.to_vec();
    sorted.sort_by_key(|r| (r.bbox.center_y(), r.hypothesis));

    let mut groups: Vec<LineGroup> = Vec::new();
    for roi in sorted {
        let y = roi.bbox.center_y();
        match groups.last_mut() {
            Some(group) if y.abs_diff(group.reference_y) < tolerance => group.members.push(roi),
            _ => groups.push(LineGroup {
                index: groups.len(),
                reference_y: y,
                members: vec![roi],
            }),
        }
    }

    for group in &mut groups {
        group.members.sort_by_key(|r| r.hypothesis);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineBox;

    fn roi(hypothesis: usize, y: u32) -> LineRoi {
        LineRoi {
            hypothesis,
            bbox: LineBox::new(0, y, 100, 40),
        }
    }

    #[test]
    fn nearby_rois_share_a_group() {
        let rois = [roi(1, 203), roi(0, 100), roi(0, 200), roi(2, 101), roi(1, 99)];
        let groups = group_lines(&rois, 4);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].index, 0);
        assert_eq!(groups[0].members.iter().map(|r| r.hypothesis).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(groups[1].members.len(), 2);
    }

    #[test]
    fn drift_is_measured_from_the_reference() {
        // 100 -> 103 -> 106: the third is 6px from the reference even though it is 3px from its neighbour
        let groups = group_lines(&[roi(0, 100), roi(1, 103), roi(2, 106)], 4);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].reference_y, 126);
    }

    #[test]
    fn no_rois_no_groups() {
        assert!(group_lines(&[], 4).is_empty());
    }
}
