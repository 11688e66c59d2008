use avl_index::{AvlTreeMap, AvlTreeSet};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

#[derive(Debug, Default)]
struct Student {
    completion_points: u32,
    course_count: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    TermLogger::init(LevelFilter::Debug, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let mut students = AvlTreeMap::new();
    for student_id in [1001, 1002, 1003, 1004, 1005] {
        students.try_insert(student_id, Student::default())?;
    }
    assert!(!students.insert(1003, Student::default()));

    if let Some(handle) = students.find(&1003) {
        if let Some(student) = students.value_mut(handle) {
            student.course_count += 1;
            student.completion_points += 4;
        }
        println!("{:?} => {:?}", students.key(handle), students.value(handle));
    }

    students.erase(&1002);
    assert!(students.get(&1002).is_none());
    println!("{students:?}");

    let mut courses = AvlTreeSet::new();
    for course_id in 0..5 {
        courses.insert(course_id);
    }
    assert!(courses.contains(&1));
    courses.remove(&1);
    assert!(!courses.contains(&1));
    println!("{courses:?}");

    Ok(())
}
