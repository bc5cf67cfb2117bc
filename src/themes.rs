//! Built-in theme catalog used to steer each replica toward a distinct context.

use rand::seq::SliceRandom;

/// Business/product contexts a replica can be re-skinned into.
pub const THEMES: &[&str] = &[
  "Coffee Shop", "Pizza Restaurant", "Bakery Counter", "Grocery Store",
  "Bookstore Inventory", "Game Store", "Electronics Shop", "Fashion Boutique",
  "Pet Store", "Flower Shop", "Music Store", "Art Gallery",
  "Sports Equipment", "Candy Store", "Toy Shop", "Pharmacy Counter",
  "Hardware Store", "Car Rental", "Hotel Booking", "Travel Agency",
  "Fitness Gym", "Library System", "Movie Theater", "Photography Studio",
  "Beauty Salon", "Ice Cream Parlor", "Juice Bar", "Bike Rental",
  "Camping Gear", "Wedding Planner", "Food Truck", "Antique Shop",
  "Farmers Market", "Seafood Market", "Dance Studio", "Driving School",
  "Language School", "Cooking Class", "Coworking Space", "Real Estate Agency",
  "Furniture Store", "Garden Center", "Plant Nursery", "Brewery Taproom",
  "Concert Hall", "Amusement Park", "Aquarium Center", "Escape Room",
  "Bowling Alley", "Tennis Club", "Dental Office", "Veterinary Clinic",
  "Courier Service", "Airline Booking", "Parking Garage", "EV Charging Station",
  "Board Game Café", "Podcast Studio", "Animation Studio", "Insurance Agency",
  "Bank Branch", "Charity Organization", "Community Center", "Ski Resort",
  "Train Service", "Recycling Plant", "Solar Installer", "Ramen Shop",
  "Sushi Bar", "Bubble Tea Shop", "Cupcake Store", "Coding Bootcamp",
  "Job Portal", "Moving Company", "Cleaning Services", "Locksmith Services",
  "Dog Grooming", "Cat Café", "Climbing Gym", "LEGO Store",
  "3D Printing Service", "Science Center", "Planetarium", "Botanical Garden",
];

/// Pick up to `n` distinct themes in random order. Never returns more than the
/// catalog holds; the prompt leaves any further replicas to the model.
pub fn pick_themes<R: rand::Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<&'static str> {
  let mut pool: Vec<&'static str> = THEMES.to_vec();
  pool.shuffle(rng);
  pool.truncate(n);
  pool
}
