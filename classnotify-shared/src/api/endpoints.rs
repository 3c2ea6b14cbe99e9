use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn with_query(url: String, params: &[(&str, Option<&str>)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter_map(|(k, v)| v.map(|v| format!("{}={}", k, enc(v))))
        .collect();
    if query.is_empty() {
        url
    } else {
        format!("{}?{}", url, query.join("&"))
    }
}

pub fn courses(base: &str, page_token: Option<&str>) -> String {
    with_query(
        base_join(base, &format!("{}/courses", API_V1_PREFIX)),
        &[("courseStates", Some("ACTIVE")), ("pageToken", page_token)],
    )
}

pub fn course_announcements(
    base: &str,
    course_id: &str,
    order_by: Option<&str>,
    page_token: Option<&str>,
) -> String {
    with_query(
        base_join(
            base,
            &format!("{}/courses/{}/announcements", API_V1_PREFIX, enc(course_id)),
        ),
        &[("orderBy", order_by), ("pageToken", page_token)],
    )
}

pub fn course_work(
    base: &str,
    course_id: &str,
    order_by: Option<&str>,
    page_token: Option<&str>,
) -> String {
    with_query(
        base_join(
            base,
            &format!("{}/courses/{}/courseWork", API_V1_PREFIX, enc(course_id)),
        ),
        &[("orderBy", order_by), ("pageToken", page_token)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courses_url_filters_active() {
        assert_eq!(
            courses("https://classroom.googleapis.com/", None),
            "https://classroom.googleapis.com/v1/courses?courseStates=ACTIVE"
        );
        assert_eq!(
            courses("http://127.0.0.1:9000", Some("abc=")),
            "http://127.0.0.1:9000/v1/courses?courseStates=ACTIVE&pageToken=abc%3D"
        );
    }

    #[test]
    fn announcements_url_encodes_order_and_course() {
        assert_eq!(
            course_announcements("http://h", "12/3", Some("updateTime desc"), None),
            "http://h/v1/courses/12%2F3/announcements?orderBy=updateTime%20desc"
        );
    }

    #[test]
    fn course_work_url_without_params() {
        assert_eq!(course_work("http://h", "42", None, None), "http://h/v1/courses/42/courseWork");
    }
}
